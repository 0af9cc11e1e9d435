use circle_track_core::Circle;

/// True when the circle's extent crosses any frame edge.
#[inline]
pub fn is_occluded(circle: &Circle, width: u32, height: u32) -> bool {
    let (x, y, r) = (circle.x, circle.y, circle.radius);
    x < r || y < r || x + r > width as f32 || y + r > height as f32
}

/// Drop circles that are only partially visible; keeps the input order.
pub fn remove_occluded(mut circles: Vec<Circle>, width: u32, height: u32) -> Vec<Circle> {
    circles.retain(|c| !is_occluded(c, width, height));
    circles
}

/// Occlusion filter bound to one frame size.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OcclusionFilter {
    pub width: u32,
    pub height: u32,
}

impl OcclusionFilter {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn apply(&self, circles: Vec<Circle>) -> Vec<Circle> {
        remove_occluded(circles, self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<Circle> {
        vec![
            Circle::new(50.0, 50.0, 10.0),  // inside
            Circle::new(5.0, 50.0, 10.0),   // left edge
            Circle::new(50.0, 9.9, 10.0),   // top edge
            Circle::new(95.0, 50.0, 10.0),  // right edge
            Circle::new(50.0, 75.0, 10.0),  // bottom edge
            Circle::new(10.0, 10.0, 10.0),  // touches two edges exactly
            Circle::new(90.0, 70.0, 10.0),  // touches right/bottom exactly
            Circle::new(30.0, 40.0, 5.0),   // inside
        ]
    }

    #[test]
    fn keeps_exactly_the_fully_visible_circles() {
        let (w, h) = (100, 80);
        let out = remove_occluded(sample(), w, h);
        assert_eq!(
            out,
            vec![
                Circle::new(50.0, 50.0, 10.0),
                Circle::new(10.0, 10.0, 10.0),
                Circle::new(90.0, 70.0, 10.0),
                Circle::new(30.0, 40.0, 5.0),
            ]
        );
        for c in sample() {
            let visible = c.x >= c.radius
                && c.y >= c.radius
                && c.x + c.radius <= w as f32
                && c.y + c.radius <= h as f32;
            assert_eq!(out.contains(&c), visible, "{c:?}");
        }
    }

    #[test]
    fn filtering_is_idempotent() {
        let filter = OcclusionFilter::new(100, 80);
        let once = filter.apply(sample());
        let twice = filter.apply(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn empty_input_stays_empty() {
        assert!(remove_occluded(Vec::new(), 10, 10).is_empty());
    }

    #[test]
    fn tiny_frame_rejects_everything_larger_than_it() {
        let circles = vec![Circle::new(2.0, 2.0, 3.0)];
        assert!(remove_occluded(circles, 4, 4).is_empty());
    }
}
