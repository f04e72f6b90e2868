//! Point Reconciler
//!
//! Owns a fixed arena of [`TrackedPoint`] slots, one per id in
//! `0..slot_count`. Each tick merges at most one frame into the arena,
//! advances smoothing for the slots that frame updated, and recomputes the
//! visibility of every slot.
//!
//! A slot's very first observation places it directly. Every later one,
//! however long the slot was hidden, is approached through the smoother so
//! points never jump on screen.
//!
//! All buffers are sized at construction; a tick never allocates.

use std::time::Duration;

use tracing::{debug, trace};

use posesync_core::{FadePolicy, Frame, PoseConfig, PoseResult, Timestamp, Vec3, ViewTransform};

use crate::{visibility_alpha, PointSample, Smoother, TrackedPoint, VisibilityStage};

/// Reconciler counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    pub ticks: u64,
    pub frames_applied: u64,
    pub observations_applied: u64,
    /// Observations whose id had no slot
    pub out_of_range: u64,
    /// Observations superseded by a later one for the same id in one frame
    pub duplicates: u64,
    /// Slots with non-zero alpha after the last tick
    pub visible_points: u32,
}

/// Merges frames into per-slot state and emits renderable samples
#[derive(Debug)]
pub struct PointReconciler {
    transform: ViewTransform,
    fade: FadePolicy,
    smoother: Smoother,
    max_step: Duration,
    points: Vec<TrackedPoint>,
    samples: Vec<PointSample>,
    /// Per-tick target scratch, indexed by slot
    targets: Vec<Option<Vec3>>,
    last_tick: Option<Timestamp>,
    stats: ReconcileStats,
}

impl PointReconciler {
    /// Create a reconciler for a validated configuration
    pub fn new(config: &PoseConfig) -> PoseResult<Self> {
        config.validate()?;

        let n = config.slot_count;
        Ok(Self {
            transform: config.transform,
            fade: config.fade,
            smoother: Smoother::new(config.smoothing),
            max_step: config.max_step,
            points: vec![TrackedPoint::default(); n],
            samples: (0..n as u32).map(PointSample::unseen).collect(),
            targets: vec![None; n],
            last_tick: None,
            stats: ReconcileStats::default(),
        })
    }

    pub fn slot_count(&self) -> usize {
        self.points.len()
    }

    pub fn point(&self, id: u32) -> Option<&TrackedPoint> {
        self.points.get(id as usize)
    }

    /// Samples produced by the last tick
    pub fn samples(&self) -> &[PointSample] {
        &self.samples
    }

    pub fn stats(&self) -> ReconcileStats {
        self.stats
    }

    /// Advance to `now`, merging `frame` if one arrived since the last tick
    pub fn tick(&mut self, frame: Option<&Frame>, now: Timestamp) -> &[PointSample] {
        // A clock that steps backwards is held at the last tick
        let now = match self.last_tick {
            Some(prev) if now < prev => prev,
            _ => now,
        };
        let dt = match self.last_tick {
            Some(prev) => (now - prev).min(self.max_step),
            None => Duration::ZERO,
        };
        self.last_tick = Some(now);
        self.stats.ticks += 1;

        if let Some(frame) = frame {
            self.apply_frame(frame, now, dt);
        }

        let mut visible = 0;
        for (point, sample) in self.points.iter().zip(self.samples.iter_mut()) {
            let age = point.last_seen.map(|seen| now - seen);
            sample.position = point.position;
            sample.alpha = visibility_alpha(&self.fade, age);
            sample.stage = VisibilityStage::classify(&self.fade, age);
            if sample.alpha > 0.0 {
                visible += 1;
            }
        }
        self.stats.visible_points = visible;

        &self.samples
    }

    /// Forget every slot, as if no frame had ever been seen
    pub fn reset(&mut self) {
        self.points.fill(TrackedPoint::default());
        for sample in &mut self.samples {
            *sample = PointSample::unseen(sample.id);
        }
        self.last_tick = None;
    }

    fn apply_frame(&mut self, frame: &Frame, now: Timestamp, dt: Duration) {
        self.targets.fill(None);

        for obs in &frame.observations {
            let Some(target) = self.targets.get_mut(obs.id as usize) else {
                self.stats.out_of_range += 1;
                trace!(slot = obs.id, slots = self.points.len(), "ignoring out-of-range id");
                continue;
            };
            if target.is_some() {
                self.stats.duplicates += 1;
            }
            *target = Some(self.transform.apply(obs.position));
        }

        let mut applied = 0;
        for (point, target) in self.points.iter_mut().zip(&self.targets) {
            let Some(target) = *target else {
                continue;
            };
            if let Some(seen) = point.last_seen {
                // Momentum from before a long absence no longer applies
                if now - seen > self.fade.grace {
                    point.velocity = Vec3::ZERO;
                }
                self.smoother
                    .step(&mut point.position, &mut point.velocity, target, dt);
                point.last_seen = Some(now);
            } else {
                point.seed(target, now);
            }
            applied += 1;
        }

        self.stats.frames_applied += 1;
        self.stats.observations_applied += applied;
        if frame.observations.len() as u64 > applied {
            debug!(
                observations = frame.observations.len(),
                applied, "frame had ignored observations"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use posesync_core::Observation;

    fn ms(v: i64) -> Timestamp {
        Timestamp::from_millis(v)
    }

    fn frame(obs: &[(u32, f32, f32, f32)]) -> Frame {
        Frame::new(
            obs.iter()
                .map(|&(id, x, y, z)| Observation::new(id, x, y, z))
                .collect(),
        )
    }

    fn reconciler() -> PointReconciler {
        PointReconciler::new(&PoseConfig::default()).unwrap()
    }

    #[test]
    fn test_emits_one_sample_per_slot() {
        let mut r = reconciler();
        let samples = r.tick(None, ms(0));
        assert_eq!(samples.len(), 33);
        assert!(samples.iter().all(|s| s.alpha == 0.0 && s.stage == VisibilityStage::Never));
        assert!(samples.iter().enumerate().all(|(i, s)| s.id == i as u32));
    }

    #[test]
    fn test_first_sighting_seeds_position() {
        let mut r = reconciler();
        let samples = r.tick(Some(&frame(&[(15, 0.5, 0.5, 0.0)])), ms(0));

        // Center of the image is the world origin
        assert_eq!(samples[15].position, Vec3::ZERO);
        assert_eq!(samples[15].alpha, 1.0);
        assert_eq!(samples[15].stage, VisibilityStage::Fresh);
    }

    #[test]
    fn test_update_moves_strictly_toward_target() {
        let mut r = reconciler();
        r.tick(Some(&frame(&[(0, 0.5, 0.5, 0.0)])), ms(0));

        // Mirrored: x = 0.25 maps to +4 world units
        let samples = r.tick(Some(&frame(&[(0, 0.25, 0.5, 0.0)])), ms(16));
        let x = samples[0].position.x;
        assert!(x > 0.0 && x < 4.0, "x = {}", x);
    }

    #[test]
    fn test_unseen_within_grace_is_held() {
        let mut r = reconciler();
        r.tick(Some(&frame(&[(3, 0.1, 0.2, 0.3)])), ms(0));
        let before = r.samples()[3].position;

        let samples = r.tick(None, ms(200));
        assert_eq!(samples[3].alpha, 1.0);
        assert_eq!(samples[3].position, before);
    }

    #[test]
    fn test_seen_once_fades_and_stays_hidden() {
        let mut r = reconciler();
        r.tick(Some(&frame(&[(7, 0.5, 0.5, 0.0)])), ms(0));

        let alpha = r.tick(None, ms(750))[7].alpha;
        assert!(alpha > 0.0 && alpha < 1.0);

        assert_eq!(r.tick(None, ms(1100))[7].alpha, 0.0);
        assert_eq!(r.tick(None, ms(60_000))[7].stage, VisibilityStage::Hidden);
        assert_eq!(r.stats().visible_points, 0);
    }

    #[test]
    fn test_out_of_range_id_is_ignored() {
        let mut r = reconciler();
        let samples = r.tick(Some(&frame(&[(99, 0.5, 0.5, 0.0)])), ms(0)).to_vec();

        assert!(samples.iter().all(|s| s.stage == VisibilityStage::Never));
        assert_eq!(r.stats().out_of_range, 1);
        assert_eq!(r.stats().observations_applied, 0);
    }

    #[test]
    fn test_duplicate_ids_last_one_wins() {
        let mut r = reconciler();
        let samples = r.tick(
            Some(&frame(&[(1, 0.0, 0.0, 0.0), (1, 0.5, 0.5, 0.0)])),
            ms(0),
        );

        assert_eq!(samples[1].position, Vec3::ZERO);
        assert_eq!(r.stats().duplicates, 1);
        assert_eq!(r.stats().observations_applied, 1);
    }

    #[test]
    fn test_reappearance_after_long_absence_interpolates() {
        let mut r = reconciler();
        r.tick(Some(&frame(&[(2, 0.5, 0.5, 0.0)])), ms(0));
        r.tick(None, ms(5_000));

        let samples = r.tick(Some(&frame(&[(2, 0.5, 0.0, 0.0)])), ms(5_016));
        // Target y is +4.5, we should be on the way, not there
        let y = samples[2].position.y;
        assert!(y > 0.0 && y < 4.5, "y = {}", y);
        assert_eq!(samples[2].alpha, 1.0);
    }

    #[test]
    fn test_reappearance_while_moving_heads_for_new_target() {
        let mut r = reconciler();
        r.tick(Some(&frame(&[(2, 0.5, 0.5, 0.0)])), ms(0));

        // Build up velocity toward world x = +8
        r.tick(Some(&frame(&[(2, 0.0, 0.5, 0.0)])), ms(16));
        r.tick(Some(&frame(&[(2, 0.0, 0.5, 0.0)])), ms(32));
        assert!(r.point(2).unwrap().velocity.x > 0.0);

        r.tick(None, ms(5_032));
        let before = r.samples()[2].position.x;

        // Reappears on the far side, world x = -8
        let after = r.tick(Some(&frame(&[(2, 1.0, 0.5, 0.0)])), ms(5_048))[2]
            .position
            .x;
        assert!(after < before && after > -8.0, "before {} after {}", before, after);
    }

    #[test]
    fn test_velocity_kept_across_short_gap() {
        let mut r = reconciler();
        r.tick(Some(&frame(&[(2, 0.5, 0.5, 0.0)])), ms(0));
        r.tick(Some(&frame(&[(2, 0.0, 0.5, 0.0)])), ms(16));
        let velocity = r.point(2).unwrap().velocity.x;
        assert!(velocity > 0.0);

        // A gap shorter than grace keeps the motion going
        r.tick(None, ms(100));
        r.tick(Some(&frame(&[(2, 0.0, 0.5, 0.0)])), ms(116));
        assert!(r.point(2).unwrap().velocity.x != 0.0);
    }

    #[test]
    fn test_step_is_clamped_after_stall() {
        let mut stalled = reconciler();
        stalled.tick(Some(&frame(&[(0, 0.5, 0.5, 0.0)])), ms(0));
        let stalled_x = stalled
            .tick(Some(&frame(&[(0, 0.0, 0.5, 0.0)])), ms(10_000))[0]
            .position
            .x;

        let mut capped = reconciler();
        capped.tick(Some(&frame(&[(0, 0.5, 0.5, 0.0)])), ms(0));
        let capped_x = capped
            .tick(Some(&frame(&[(0, 0.0, 0.5, 0.0)])), ms(100))[0]
            .position
            .x;

        assert_eq!(stalled_x, capped_x);
    }

    #[test]
    fn test_extreme_host_timestamps() {
        let mut r = reconciler();
        r.tick(Some(&frame(&[(4, 0.5, 0.5, 0.0)])), Timestamp(i64::MIN));

        let sample = r.tick(None, Timestamp(i64::MAX))[4];
        assert_eq!(sample.stage, VisibilityStage::Hidden);

        let sample = r.tick(Some(&frame(&[(4, 0.5, 0.5, 0.0)])), Timestamp(i64::MIN))[4];
        assert!(sample.position.is_finite());
    }

    #[test]
    fn test_clock_going_backwards_is_held() {
        let mut r = reconciler();
        r.tick(None, ms(1000));
        r.tick(Some(&frame(&[(4, 0.5, 0.5, 0.0)])), ms(500));

        assert_eq!(r.point(4).unwrap().last_seen, Some(ms(1000)));
    }

    #[test]
    fn test_reset_forgets_slots() {
        let mut r = reconciler();
        r.tick(Some(&frame(&[(4, 0.5, 0.5, 0.0)])), ms(0));
        r.reset();

        assert!(!r.point(4).unwrap().is_seen());
        assert_eq!(r.samples()[4].stage, VisibilityStage::Never);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = PoseConfig {
            slot_count: 0,
            ..PoseConfig::default()
        };
        assert!(PointReconciler::new(&config).is_err());
    }
}
