use serde::{Deserialize, Serialize};
use tally_core::{levenshtein, Item, Receipt};

/// Divergence between one produced receipt and its ground-truth label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    #[serde(rename = "date_dist")]
    pub date_distance: usize,
    #[serde(rename = "total_dist")]
    pub total_distance: usize,
    #[serde(rename = "item_dist")]
    pub item_distance: usize,
    #[serde(rename = "total_word_distance")]
    pub total_distance_sum: usize,
    #[serde(rename = "total_characters_label")]
    pub total_label_characters: usize,
    #[serde(rename = "normalized_total_error")]
    pub normalized_error: f64,
}

/// Pairing of label items to output items.
///
/// `pairs[k] = (label_index, Some(output_index))` for a matched label item,
/// `None` when every output item was already taken. `claimed[j]` records
/// whether output item `j` was paired with anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemAlignment {
    pub pairs: Vec<(usize, Option<usize>)>,
    pub claimed: Vec<bool>,
}

impl ItemAlignment {
    /// Output items no label item was paired with.
    pub fn unclaimed(&self) -> impl Iterator<Item = usize> + '_ {
        self.claimed
            .iter()
            .enumerate()
            .filter(|(_, taken)| !**taken)
            .map(|(j, _)| j)
    }
}

/// Greedy nearest-name matching in label order. Each label item takes the
/// closest unclaimed output item by name distance; on a tie the earlier
/// output item wins.
pub fn align_items(label: &[Item], output: &[Item]) -> ItemAlignment {
    let mut claimed = vec![false; output.len()];
    let mut pairs = Vec::with_capacity(label.len());

    for (i, wanted) in label.iter().enumerate() {
        let best = output
            .iter()
            .enumerate()
            .filter(|(j, _)| !claimed[*j])
            .map(|(j, candidate)| (j, levenshtein(&wanted.name, &candidate.name)))
            .min_by_key(|&(_, distance)| distance)
            .map(|(j, _)| j);
        if let Some(j) = best {
            claimed[j] = true;
        }
        pairs.push((i, best));
    }

    ItemAlignment { pairs, claimed }
}

fn item_distance(label: &[Item], output: &[Item], alignment: &ItemAlignment) -> usize {
    let paired: usize = alignment
        .pairs
        .iter()
        .map(|&(i, matched)| match matched {
            Some(j) => {
                let (a, b) = (&label[i], &output[j]);
                levenshtein(&a.name, &b.name)
                    + levenshtein(&a.price_whole_part, &b.price_whole_part)
                    + levenshtein(&a.price_fractional_part, &b.price_fractional_part)
            }
            // Nothing left to compare against: every character counts as wrong.
            None => label[i].char_len(),
        })
        .sum();
    let spurious: usize = alignment.unclaimed().map(|j| output[j].char_len()).sum();
    paired + spurious
}

pub fn normalized_error(distance: usize, label_chars: usize) -> f64 {
    distance as f64 / (label_chars as f64 + 1.0)
}

/// Compare `output` against the ground-truth `label`.
pub fn evaluate(label: &Receipt, output: &Receipt) -> Evaluation {
    let date_distance = levenshtein(&label.day, &output.day)
        + levenshtein(&label.month, &output.month)
        + levenshtein(&label.year, &output.year);
    let total_distance = levenshtein(&label.total_whole_part, &output.total_whole_part)
        + levenshtein(&label.total_fractional_part, &output.total_fractional_part);

    let alignment = align_items(&label.items, &output.items);
    let item_distance = item_distance(&label.items, &output.items, &alignment);

    let total_distance_sum = date_distance + total_distance + item_distance;
    let total_label_characters = label.label_characters();

    Evaluation {
        date_distance,
        total_distance,
        item_distance,
        total_distance_sum,
        total_label_characters,
        normalized_error: normalized_error(total_distance_sum, total_label_characters),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn label() -> Receipt {
        Receipt {
            day: "05".into(),
            month: "11".into(),
            year: "2021".into(),
            total_whole_part: "4".into(),
            total_fractional_part: "49".into(),
            items: vec![Item::new("milk", "2", "50"), Item::new("bread", "1", "99")],
        }
    }

    #[test]
    fn identical_receipts_have_zero_error() {
        let e = evaluate(&label(), &label());
        assert_eq!(e.total_distance_sum, 0);
        assert_eq!(e.total_label_characters, 26);
        assert_eq!(e.normalized_error, 0.0);
    }

    #[test]
    fn normalized_error_adds_one_to_the_denominator() {
        assert_eq!(normalized_error(0, 10), 0.0);
        assert_eq!(normalized_error(5, 10), 5.0 / 11.0);
        assert_eq!(normalized_error(3, 0), 3.0);
    }

    #[test]
    fn out_of_order_items_still_match_exactly() {
        let mut output = label();
        output.items.reverse();
        let alignment = align_items(&label().items, &output.items);
        assert_eq!(alignment.pairs, vec![(0, Some(1)), (1, Some(0))]);
        assert_eq!(evaluate(&label(), &output).item_distance, 0);
    }

    #[test]
    fn field_distances_are_summed() {
        let mut output = label();
        output.day = "06".into();
        output.year = "2012".into();
        output.total_fractional_part = "48".into();
        let e = evaluate(&label(), &output);
        assert_eq!(e.date_distance, 3);
        assert_eq!(e.total_distance, 1);
        assert_eq!(e.item_distance, 0);
        assert_eq!(e.total_distance_sum, 4);
        assert_eq!(e.normalized_error, 4.0 / 27.0);
    }

    #[test]
    fn missing_items_are_charged_in_full() {
        let mut output = label();
        output.items.truncate(1);
        // "bread" + "1" + "99"
        assert_eq!(evaluate(&label(), &output).item_distance, 8);
    }

    #[test]
    fn spurious_items_are_charged_in_full() {
        let mut output = label();
        output.items.push(Item::new("bag", "0", "10"));
        assert_eq!(evaluate(&label(), &output).item_distance, 6);
    }

    #[test]
    fn empty_output_costs_every_label_character() {
        let e = evaluate(&label(), &Receipt::default());
        assert_eq!(e.total_distance_sum, 26);
        assert_eq!(e.normalized_error, 26.0 / 27.0);
    }

    #[test]
    fn duplicate_names_are_claimed_once_each() {
        let items = vec![Item::new("milk", "2", "50"), Item::new("milk", "2", "50")];
        let alignment = align_items(&items, &items);
        assert_eq!(alignment.pairs, vec![(0, Some(0)), (1, Some(1))]);
        assert!(alignment.unclaimed().next().is_none());
    }

    #[test]
    fn ties_go_to_the_earlier_output_item() {
        let label = vec![Item::new("cat", "1", "00")];
        let output = vec![Item::new("bat", "1", "00"), Item::new("cot", "1", "00")];
        let alignment = align_items(&label, &output);
        assert_eq!(alignment.pairs, vec![(0, Some(0))]);
        assert_eq!(alignment.unclaimed().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn report_uses_established_keys() {
        let value = serde_json::to_value(evaluate(&label(), &label())).unwrap();
        for key in [
            "date_dist",
            "total_dist",
            "item_dist",
            "total_word_distance",
            "total_characters_label",
            "normalized_total_error",
        ] {
            assert!(value.get(key).is_some(), "missing {key}");
        }
    }
}
