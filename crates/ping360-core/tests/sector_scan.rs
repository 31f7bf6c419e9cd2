//! Tests for sector sweeping

#[cfg(test)]
mod tests {
    use ping360_core::sensor::{ScanHead, ANGULAR_RESOLUTION};

    fn head(sector_size: u16, angular_speed: u16) -> ScanHead {
        ScanHead {
            angle: 0,
            sector_size,
            angular_speed,
            reverse_direction: false,
        }
    }

    /// Signed bearing in (-200, 200]
    fn relative(angle: u16) -> i32 {
        let angle = angle as i32;
        if angle >= ANGULAR_RESOLUTION as i32 / 2 {
            angle - ANGULAR_RESOLUTION as i32
        } else {
            angle
        }
    }

    #[test]
    fn test_sweep_stays_in_sector_and_reaches_both_edges() {
        for (sector, speed) in [(100, 1), (100, 3), (60, 7), (2, 1), (399, 5)] {
            let mut head = head(sector, speed);
            let half = sector as i32 / 2;
            let (mut low, mut high) = (0, 0);

            for _ in 0..2000 {
                let angle = head.advance();
                assert!(angle < ANGULAR_RESOLUTION);
                let bearing = relative(angle);
                assert!(
                    bearing.abs() <= half,
                    "sector {sector} speed {speed}: bearing {bearing}"
                );
                low = low.min(bearing);
                high = high.max(bearing);
            }

            // Within one step of either edge
            assert!(low <= -half + speed as i32 - 1, "sector {sector}: low {low}");
            assert!(high >= half - speed as i32 + 1, "sector {sector}: high {high}");
        }
    }

    #[test]
    fn test_full_circle_wraps() {
        let mut head = head(ANGULAR_RESOLUTION, 10);
        let angles: Vec<u16> = (0..45).map(|_| head.advance()).collect();

        assert_eq!(angles[0], 10);
        assert_eq!(angles[38], 390);
        assert_eq!(angles[39], 0);
        assert!(!head.reverse_direction);
    }

    #[test]
    fn test_is_inside_band() {
        let head = head(100, 1);
        for step in -250..=250 {
            let bearing = (step as i32).rem_euclid(ANGULAR_RESOLUTION as i32);
            let expected = bearing <= 50 || bearing >= 350;
            assert_eq!(head.is_inside(step), expected, "step {step}");
        }
    }

    #[test]
    fn test_is_inside_symmetric() {
        for sector in [1, 2, 37, 100, 250, 400] {
            let head = head(sector, 1);
            for step in 0..200 {
                assert_eq!(head.is_inside(step), head.is_inside(-step), "sector {sector} step {step}");
            }
        }
    }

    #[test]
    fn test_outside_head_returns_to_zero() {
        let mut head = ScanHead {
            angle: 200,
            sector_size: 40,
            angular_speed: 2,
            reverse_direction: false,
        };

        let step = head.next_step();
        assert_eq!(step, -200);
        assert_eq!(head.apply(step), 0);
    }
}
