//! Convex hulls and minimum-area rotated rectangles over contour points.

/// A 2-D point in image coordinates (y grows downwards).
pub type Point = (f64, f64);

/// Minimum-area rectangle enclosing a point set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotatedRect {
    pub center: Point,
    /// Extent along the edge that `angle` describes.
    pub width: f64,
    pub height: f64,
    /// Degrees in `[-90, 0)` between the x axis and the width edge.
    pub angle: f64,
}

impl RotatedRect {
    pub fn area(&self) -> f64 {
        self.width * self.height
    }
}

fn cross(o: Point, a: Point, b: Point) -> f64 {
    (a.0 - o.0) * (b.1 - o.1) - (a.1 - o.1) * (b.0 - o.0)
}

/// Andrew's monotone chain. Collinear points are dropped.
pub fn convex_hull(points: &[Point]) -> Vec<Point> {
    let mut pts = points.to_vec();
    pts.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1)));
    pts.dedup();
    if pts.len() < 3 {
        return pts;
    }

    let mut hull = half_hull(pts.iter());
    hull.extend(half_hull(pts.iter().rev()));
    hull
}

fn half_hull<'a>(points: impl Iterator<Item = &'a Point>) -> Vec<Point> {
    let mut chain: Vec<Point> = Vec::new();
    for &p in points {
        while chain.len() >= 2 && cross(chain[chain.len() - 2], chain[chain.len() - 1], p) <= 0.0 {
            chain.pop();
        }
        chain.push(p);
    }
    // The last point starts the other half.
    chain.pop();
    chain
}

/// Rotating calipers over the convex hull. `None` for an empty point set.
pub fn min_area_rect(points: &[Point]) -> Option<RotatedRect> {
    let hull = convex_hull(points);
    match hull.len() {
        0 => None,
        1 => Some(RotatedRect { center: hull[0], width: 0.0, height: 0.0, angle: -90.0 }),
        _ => {
            let mut best: Option<RotatedRect> = None;
            for i in 0..hull.len() {
                let (a, b) = (hull[i], hull[(i + 1) % hull.len()]);
                let len = (b.0 - a.0).hypot(b.1 - a.1);
                if len == 0.0 {
                    continue;
                }
                let dir = ((b.0 - a.0) / len, (b.1 - a.1) / len);
                let normal = (-dir.1, dir.0);

                let (mut u_min, mut u_max, mut v_min, mut v_max) =
                    (f64::MAX, f64::MIN, f64::MAX, f64::MIN);
                for p in &hull {
                    let u = p.0 * dir.0 + p.1 * dir.1;
                    let v = p.0 * normal.0 + p.1 * normal.1;
                    u_min = u_min.min(u);
                    u_max = u_max.max(u);
                    v_min = v_min.min(v);
                    v_max = v_max.max(v);
                }

                let rect = RotatedRect {
                    center: (
                        dir.0 * (u_min + u_max) / 2.0 + normal.0 * (v_min + v_max) / 2.0,
                        dir.1 * (u_min + u_max) / 2.0 + normal.1 * (v_min + v_max) / 2.0,
                    ),
                    width: u_max - u_min,
                    height: v_max - v_min,
                    angle: dir.1.atan2(dir.0).to_degrees(),
                };
                if best.map_or(true, |r| rect.area() < r.area()) {
                    best = Some(rect);
                }
            }
            best.map(canonicalize)
        }
    }
}

/// Rotate the angle reference into `[-90, 0)`, swapping sides on odd quarter turns.
fn canonicalize(rect: RotatedRect) -> RotatedRect {
    let angle = rect.angle.rem_euclid(90.0) - 90.0;
    let quarter_turns = ((rect.angle - angle) / 90.0).round() as i64;
    let (width, height) = if quarter_turns.rem_euclid(2) == 1 {
        (rect.height, rect.width)
    } else {
        (rect.width, rect.height)
    };
    RotatedRect { angle, width, height, ..rect }
}
