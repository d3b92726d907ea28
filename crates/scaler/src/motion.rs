/// Damping multiplier for a player shrunk to `player_scale`. The fourth root
/// keeps small bodies from feeling glued to the floor while still slowing
/// them down.
pub fn movement_slowdown(player_scale: f32) -> f32 {
    if !player_scale.is_finite() || player_scale <= 0.0 {
        return 1.0;
    }
    (1.0 / player_scale).powf(0.25)
}

/// Speed of an entity after its scale moved from `old_scale` to `new_scale`,
/// keeping speed proportional to size.
pub fn proportional_speed(speed: f32, old_scale: f32, new_scale: f32) -> Option<f32> {
    if old_scale <= 0.0 || !old_scale.is_finite() {
        return None;
    }
    Some(speed * new_scale / old_scale)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_size_player_is_not_slowed() {
        assert_eq!(movement_slowdown(1.0), 1.0);
    }

    #[test]
    fn sixteenth_scale_doubles_damping() {
        assert!((movement_slowdown(1.0 / 16.0) - 2.0).abs() < 1e-5);
    }

    #[test]
    fn degenerate_scale_falls_back_to_neutral() {
        assert_eq!(movement_slowdown(0.0), 1.0);
        assert_eq!(movement_slowdown(f32::NAN), 1.0);
    }

    #[test]
    fn speed_follows_scale_ratio() {
        assert_eq!(proportional_speed(4.0, 1.0, 0.5), Some(2.0));
        assert_eq!(proportional_speed(4.0, 0.0, 0.5), None);
    }
}
