use std::time::Duration;

use tracing::{info, warn};

use super::{resolve_companion_resize, resolve_player_resize, ModeKind, ScalingMode};
use crate::host::SceneHost;
use crate::settings::{ScalePersistence, ScaleSnapshot};
use crate::sync::{ScaleSync, ScaleTargets, TickReport};

/// Resize calls only move the targets; `update` is the sole writer of the
/// scales the host sees. Target changes are persisted once no new change has
/// arrived for the save timeout.
pub struct FixedMode {
    player_scale: f32,
    restore_scale: f32,
    companion_scale: f32,
    save_timeout: Duration,
    pending_save: Option<Duration>,
    persistence: Box<dyn ScalePersistence>,
}

impl FixedMode {
    pub fn new(
        initial: ScaleSnapshot,
        save_timeout: Duration,
        persistence: Box<dyn ScalePersistence>,
    ) -> Self {
        Self {
            player_scale: initial.player_scale,
            restore_scale: initial.player_restore_scale,
            companion_scale: initial.companion_scale,
            save_timeout,
            pending_save: None,
            persistence,
        }
    }

    pub fn snapshot(&self) -> ScaleSnapshot {
        ScaleSnapshot {
            companion_scale: self.companion_scale,
            player_scale: self.player_scale,
            player_restore_scale: self.restore_scale,
        }
    }

    /// Time left before the pending save fires, if one is pending.
    pub fn pending_save(&self) -> Option<Duration> {
        self.pending_save
    }

    fn mark_for_saving(&mut self) {
        self.pending_save = Some(self.save_timeout);
    }

    fn advance_save_timer(&mut self, dt: Duration) {
        let Some(remaining) = self.pending_save else {
            return;
        };
        let remaining = remaining.saturating_sub(dt);
        if !remaining.is_zero() {
            self.pending_save = Some(remaining);
            return;
        }

        self.pending_save = None;
        let snapshot = self.snapshot();
        match self.persistence.save(&snapshot) {
            Ok(()) => info!(
                companion_scale = snapshot.companion_scale,
                player_scale = snapshot.player_scale,
                player_restore_scale = snapshot.player_restore_scale,
                "scales_saved"
            ),
            Err(error) => {
                // Scales are still dirty; try again after another window.
                self.pending_save = Some(self.save_timeout);
                warn!(error = %error, "scales_save_failed");
            }
        }
    }
}

impl ScalingMode for FixedMode {
    fn kind(&self) -> ModeKind {
        ModeKind::Fixed
    }

    fn resize_player(
        &mut self,
        _sync: &mut ScaleSync,
        _host: &mut dyn SceneHost,
        fixed: Option<f32>,
        factor: Option<f32>,
    ) {
        let resize = resolve_player_resize(self.player_scale, self.restore_scale, fixed, factor);
        self.player_scale = resize.scale;
        if let Some(restore) = resize.restore {
            self.restore_scale = restore;
        }
        self.mark_for_saving();
        info!(player_scale = self.player_scale, "player_target_set");
    }

    fn resize_companion(
        &mut self,
        _sync: &mut ScaleSync,
        _host: &mut dyn SceneHost,
        fixed: Option<f32>,
        factor: Option<f32>,
    ) {
        if let Some(scale) = resolve_companion_resize(self.companion_scale, fixed, factor) {
            self.companion_scale = scale;
            self.mark_for_saving();
        }
        info!(companion_scale = self.companion_scale, "companion_target_set");
    }

    fn update(
        &mut self,
        sync: &mut ScaleSync,
        host: &mut dyn SceneHost,
        dt: Duration,
    ) -> TickReport {
        let report = sync.reconcile(
            host,
            ScaleTargets {
                player: self.player_scale,
                companion: self.companion_scale,
            },
        );
        self.advance_save_timer(dt);
        report
    }

    fn targets(&self) -> Option<ScaleTargets> {
        Some(ScaleTargets {
            player: self.player_scale,
            companion: self.companion_scale,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::host::EntityCategory;
    use crate::settings::SettingsError;
    use crate::sim::SimWorld;
    use crate::sync::SyncOptions;

    #[derive(Clone, Default)]
    struct RecordingPersistence {
        saves: Rc<RefCell<Vec<ScaleSnapshot>>>,
    }

    impl ScalePersistence for RecordingPersistence {
        fn save(&mut self, snapshot: &ScaleSnapshot) -> Result<(), SettingsError> {
            self.saves.borrow_mut().push(*snapshot);
            Ok(())
        }
    }

    struct FailingPersistence {
        attempts: Rc<RefCell<u32>>,
        failures_left: u32,
    }

    impl ScalePersistence for FailingPersistence {
        fn save(&mut self, _scales: &ScaleSnapshot) -> Result<(), SettingsError> {
            *self.attempts.borrow_mut() += 1;
            if self.failures_left == 0 {
                return Ok(());
            }
            self.failures_left -= 1;
            Err(SettingsError::Write {
                path: "settings.json".into(),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
            })
        }
    }

    fn full_size() -> ScaleSnapshot {
        ScaleSnapshot {
            companion_scale: 1.0,
            player_scale: 1.0,
            player_restore_scale: 1.0,
        }
    }

    fn fixed_mode(timeout_secs: u64) -> (FixedMode, Rc<RefCell<Vec<ScaleSnapshot>>>) {
        let persistence = RecordingPersistence::default();
        let saves = Rc::clone(&persistence.saves);
        let mode = FixedMode::new(
            full_size(),
            Duration::from_secs(timeout_secs),
            Box::new(persistence),
        );
        (mode, saves)
    }

    #[test]
    fn resize_moves_only_the_target_until_update() {
        let mut world = SimWorld::default();
        let companion = world.spawn_companion("companion", 1.0);
        let mut sync = ScaleSync::new(SyncOptions::default(), false);
        let (mut mode, _) = fixed_mode(10);

        mode.resize_companion(&mut sync, &mut world, Some(0.5), None);
        assert_eq!(world.entity(companion).expect("companion").scale, 1.0);

        mode.update(&mut sync, &mut world, Duration::from_millis(16));
        assert_eq!(world.entity(companion).expect("companion").scale, 0.5);
    }

    #[test]
    fn debounced_save_fires_exactly_once_after_timeout() {
        let mut world = SimWorld::default();
        let mut sync = ScaleSync::new(SyncOptions::default(), false);
        let (mut mode, saves) = fixed_mode(10);

        mode.resize_player(&mut sync, &mut world, None, Some(0.5));
        for _ in 0..9 {
            mode.update(&mut sync, &mut world, Duration::from_secs(1));
        }
        assert!(saves.borrow().is_empty());

        mode.update(&mut sync, &mut world, Duration::from_secs(1));
        assert_eq!(saves.borrow().len(), 1);

        for _ in 0..30 {
            mode.update(&mut sync, &mut world, Duration::from_secs(1));
        }
        assert_eq!(saves.borrow().len(), 1);
        let saved = saves.borrow()[0];
        assert_eq!(saved.player_scale, 0.5);
        assert_eq!(saved.player_restore_scale, 0.5);
    }

    #[test]
    fn each_new_intent_restarts_the_window() {
        let mut world = SimWorld::default();
        let mut sync = ScaleSync::new(SyncOptions::default(), false);
        let (mut mode, saves) = fixed_mode(2);

        mode.resize_companion(&mut sync, &mut world, None, Some(0.9));
        mode.update(&mut sync, &mut world, Duration::from_millis(1500));
        mode.resize_companion(&mut sync, &mut world, None, Some(0.9));
        mode.update(&mut sync, &mut world, Duration::from_millis(1500));
        assert!(saves.borrow().is_empty());
        assert_eq!(mode.pending_save(), Some(Duration::from_millis(500)));

        mode.update(&mut sync, &mut world, Duration::from_millis(500));
        assert_eq!(saves.borrow().len(), 1);
        assert!((saves.borrow()[0].companion_scale - 0.81).abs() < 1e-6);
    }

    #[test]
    fn restore_returns_to_the_last_factor_scale() {
        let mut world = SimWorld::default();
        let player = world.spawn("player", EntityCategory::Player, 1.0);
        let mut sync = ScaleSync::new(SyncOptions::default(), false);
        let (mut mode, _) = fixed_mode(10);

        mode.resize_player(&mut sync, &mut world, None, Some(0.5));
        mode.resize_player(&mut sync, &mut world, Some(1.0), None);
        mode.update(&mut sync, &mut world, Duration::from_millis(16));
        assert_eq!(world.entity(player).expect("player").scale, 1.0);

        mode.resize_player(&mut sync, &mut world, None, None);
        mode.update(&mut sync, &mut world, Duration::from_millis(16));
        assert_eq!(world.entity(player).expect("player").scale, 0.5);
    }

    #[test]
    fn failed_save_is_retried_after_another_window() {
        let mut world = SimWorld::default();
        let mut sync = ScaleSync::new(SyncOptions::default(), false);
        let attempts = Rc::new(RefCell::new(0));
        let persistence = FailingPersistence {
            attempts: Rc::clone(&attempts),
            failures_left: 1,
        };
        let mut mode = FixedMode::new(full_size(), Duration::from_secs(2), Box::new(persistence));

        mode.resize_player(&mut sync, &mut world, None, Some(0.5));
        for _ in 0..2 {
            mode.update(&mut sync, &mut world, Duration::from_secs(1));
        }
        assert_eq!(*attempts.borrow(), 1);
        assert_eq!(mode.pending_save(), Some(Duration::from_secs(2)));

        for _ in 0..2 {
            mode.update(&mut sync, &mut world, Duration::from_secs(1));
        }
        assert_eq!(*attempts.borrow(), 2);
        assert_eq!(mode.pending_save(), None);

        for _ in 0..5 {
            mode.update(&mut sync, &mut world, Duration::from_secs(1));
        }
        assert_eq!(*attempts.borrow(), 2);
    }

    #[test]
    fn no_save_without_intent() {
        let mut world = SimWorld::default();
        let mut sync = ScaleSync::new(SyncOptions::default(), false);
        let (mut mode, saves) = fixed_mode(2);

        for _ in 0..10 {
            mode.update(&mut sync, &mut world, Duration::from_secs(1));
        }
        assert!(saves.borrow().is_empty());
        assert_eq!(mode.pending_save(), None);
    }
}
