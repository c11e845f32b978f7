// renderer/journal.rs - deferred draw list filled during traversal
use std::cmp::Ordering;
use std::mem;

use glam::Mat4;
use hecs::Entity;

use super::pass::RenderPass;
use crate::error::RenderResult;

#[derive(Debug, Clone, Copy)]
pub struct JournalEntry {
    pub entity: Entity,
    /// Accumulated view-space transform captured at traversal time.
    pub transform: Mat4,
}

impl JournalEntry {
    /// View-space z of the entity origin; larger is further from the camera.
    pub fn depth(&self) -> f32 {
        self.transform.w_axis.z
    }
}

/// Frame-scoped list of entities to draw for one pass.
///
/// Traversal fills it, [`Journal::flush`] drains it. It is empty between
/// passes.
#[derive(Debug, Default)]
pub struct Journal {
    entries: Vec<JournalEntry>,
    pass: Option<RenderPass>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts collecting for `pass`. Leftover entries are a bug in the caller.
    pub fn begin(&mut self, pass: RenderPass) {
        debug_assert!(
            self.entries.is_empty(),
            "journal still holds {} entries from {:?} when starting {:?}",
            self.entries.len(),
            self.pass,
            pass
        );
        self.pass = Some(pass);
    }

    pub fn log(&mut self, entity: Entity, pass: RenderPass, transform: Mat4) {
        debug_assert!(
            self.pass.map_or(true, |current| current == pass),
            "entity logged for {:?} while the journal is collecting {:?}",
            pass,
            self.pass
        );
        self.pass = Some(pass);
        self.entries.push(JournalEntry { entity, transform });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sorts by the pass's draw order and hands every entry to `draw`.
    ///
    /// The journal is empty afterwards even when `draw` fails part way. Returns
    /// the number of entries drawn.
    pub fn flush<F>(&mut self, pass: RenderPass, mut draw: F) -> RenderResult<usize>
    where
        F: FnMut(&JournalEntry) -> RenderResult<()>,
    {
        debug_assert!(
            self.entries.is_empty() || self.pass == Some(pass),
            "flushing {:?} with entries collected for {:?}",
            pass,
            self.pass
        );

        let mut entries = mem::take(&mut self.entries);
        self.pass = None;

        sort_entries(&mut entries, pass);
        let result = entries.iter().try_for_each(&mut draw);
        let count = entries.len();

        // Hand the allocation back for the next pass.
        entries.clear();
        self.entries = entries;

        result.map(|()| count)
    }
}

/// Stable, so equal depths keep traversal order.
pub(crate) fn sort_entries(entries: &mut [JournalEntry], pass: RenderPass) {
    if pass.requires_back_to_front_sort() {
        entries.sort_by(|a, b| back_to_front(a.depth(), b.depth()));
    } else {
        entries.sort_by(|a, b| a.depth().total_cmp(&b.depth()));
    }
}

fn back_to_front(a: f32, b: f32) -> Ordering {
    b.total_cmp(&a)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RenderError;
    use glam::Vec3;

    fn entities(count: usize) -> Vec<Entity> {
        let mut world = hecs::World::new();
        (0..count).map(|_| world.spawn(())).collect()
    }

    fn at_depth(z: f32) -> Mat4 {
        Mat4::from_translation(Vec3::new(0.0, 0.0, z))
    }

    fn drain(journal: &mut Journal, pass: RenderPass) -> Vec<f32> {
        let mut order = Vec::new();
        journal
            .flush(pass, |entry| {
                order.push(entry.depth());
                Ok(())
            })
            .unwrap();
        order
    }

    fn log_depths(journal: &mut Journal, pass: RenderPass, depths: &[f32]) -> Vec<Entity> {
        let ids = entities(depths.len());
        journal.begin(pass);
        for (&entity, &z) in ids.iter().zip(depths) {
            journal.log(entity, pass, at_depth(z));
        }
        ids
    }

    #[test]
    fn blended_draws_furthest_first() {
        let mut journal = Journal::new();
        log_depths(&mut journal, RenderPass::ColorBlended, &[5.0, 1.0, 3.0]);

        assert_eq!(drain(&mut journal, RenderPass::ColorBlended), vec![5.0, 3.0, 1.0]);
    }

    #[test]
    fn unblended_draws_nearest_first() {
        let mut journal = Journal::new();
        log_depths(&mut journal, RenderPass::ColorUnblended, &[5.0, 1.0, 3.0]);

        assert_eq!(drain(&mut journal, RenderPass::ColorUnblended), vec![1.0, 3.0, 5.0]);
    }

    #[test]
    fn mask_passes_draw_nearest_first() {
        for pass in [RenderPass::Shadow, RenderPass::DofDepth] {
            let mut journal = Journal::new();
            log_depths(&mut journal, pass, &[2.0, -4.0, 9.0]);
            assert_eq!(drain(&mut journal, pass), vec![-4.0, 2.0, 9.0]);
        }
    }

    #[test]
    fn equal_depths_keep_log_order() {
        for pass in RenderPass::ALL {
            let mut journal = Journal::new();
            let ids = log_depths(&mut journal, pass, &[2.0, 7.0, 2.0, 7.0, 2.0]);

            let mut visited = Vec::new();
            journal
                .flush(pass, |entry| {
                    visited.push(entry.entity);
                    Ok(())
                })
                .unwrap();

            let expected = if pass.requires_back_to_front_sort() {
                vec![ids[1], ids[3], ids[0], ids[2], ids[4]]
            } else {
                vec![ids[0], ids[2], ids[4], ids[1], ids[3]]
            };
            assert_eq!(visited, expected, "{:?}", pass);
        }
    }

    /// Linear congruential generator; enough to shuffle depths reproducibly.
    struct Lcg(u64);

    impl Lcg {
        fn next(&mut self, bound: u64) -> u64 {
            self.0 = self
                .0
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            (self.0 >> 33) % bound
        }
    }

    #[test]
    fn shuffled_depths_sort_stably_in_every_pass() {
        let mut rng = Lcg(0x5eed);
        for round in 0..200 {
            let count = rng.next(40) as usize;
            // Few distinct values so ties are common.
            let depths: Vec<f32> = (0..count).map(|_| rng.next(7) as f32 - 3.0).collect();

            for pass in RenderPass::ALL {
                let mut journal = Journal::new();
                let ids = log_depths(&mut journal, pass, &depths);

                let mut visited = Vec::new();
                journal
                    .flush(pass, |entry| {
                        let logged = ids.iter().position(|&id| id == entry.entity).unwrap();
                        visited.push((entry.depth(), logged));
                        Ok(())
                    })
                    .unwrap();

                assert_eq!(visited.len(), count, "round {round} {pass:?}");
                let mut seen: Vec<usize> = visited.iter().map(|&(_, i)| i).collect();
                seen.sort_unstable();
                assert!(seen.iter().copied().eq(0..count), "round {round} {pass:?}");

                for pair in visited.windows(2) {
                    let ((a, first), (b, second)) = (pair[0], pair[1]);
                    if pass.requires_back_to_front_sort() {
                        assert!(a >= b, "round {round} {pass:?}: {a} before {b}");
                    } else {
                        assert!(a <= b, "round {round} {pass:?}: {a} before {b}");
                    }
                    if a == b {
                        assert!(first < second, "round {round} {pass:?}: tie reordered");
                    }
                }
            }
        }
    }

    #[test]
    fn empty_flush_is_a_no_op() {
        let mut journal = Journal::new();
        let mut calls = 0;
        let drawn = journal
            .flush(RenderPass::ColorBlended, |_| {
                calls += 1;
                Ok(())
            })
            .unwrap();

        assert_eq!(drawn, 0);
        assert_eq!(calls, 0);
        assert!(journal.is_empty());

        // And again, back to back.
        assert_eq!(journal.flush(RenderPass::Shadow, |_| Ok(())).unwrap(), 0);
    }

    #[test]
    fn flush_clears_even_when_a_draw_fails() {
        let mut journal = Journal::new();
        log_depths(&mut journal, RenderPass::ColorUnblended, &[1.0, 2.0, 3.0]);

        let mut attempts = 0;
        let result = journal.flush(RenderPass::ColorUnblended, |_| {
            attempts += 1;
            Err(RenderError::ProgramCompilation {
                label: "broken".into(),
                message: "syntax error".into(),
            })
        });

        assert!(result.is_err());
        assert_eq!(attempts, 1);
        assert_eq!(journal.len(), 0);

        // The next pass starts clean.
        journal.begin(RenderPass::ColorBlended);
        assert!(journal.is_empty());
    }

    #[test]
    fn flush_reports_draw_count() {
        let mut journal = Journal::new();
        log_depths(&mut journal, RenderPass::Shadow, &[1.0, 1.0]);
        assert_eq!(journal.len(), 2);
        assert_eq!(journal.flush(RenderPass::Shadow, |_| Ok(())).unwrap(), 2);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "journal still holds")]
    fn starting_a_pass_with_leftovers_panics() {
        let mut journal = Journal::new();
        log_depths(&mut journal, RenderPass::Shadow, &[1.0]);
        journal.begin(RenderPass::ColorUnblended);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "flushing")]
    fn flushing_another_pass_with_leftovers_panics() {
        let mut journal = Journal::new();
        log_depths(&mut journal, RenderPass::Shadow, &[1.0]);
        let _ = journal.flush(RenderPass::ColorBlended, |_| Ok(()));
    }
}
