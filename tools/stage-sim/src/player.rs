use std::collections::HashSet;

use fantasia_domain::InputEvent;
use fantasia_engine::GameSession;

/// Scripted stand-in for a human at the keyboard.
///
/// Plays each answerable target's guide voicing `offset_ms` after its nominal
/// time, optionally sitting out every `miss_every`-th target.
pub struct AutoPlayer {
    offset_ms: f64,
    miss_every: Option<usize>,
    decided: HashSet<usize>,
    seen: usize,
}

impl AutoPlayer {
    pub fn new(offset_ms: f64, miss_every: Option<usize>) -> Self {
        Self {
            offset_ms,
            miss_every: miss_every.filter(|n| *n > 0),
            decided: HashSet::new(),
            seen: 0,
        }
    }

    /// Notes to send with the tick at raw time `now_ms`.
    pub fn respond(&mut self, session: &GameSession, now_ms: f64) -> Vec<InputEvent> {
        let clock = session.time_base().session_ms(now_ms);
        let mut notes = Vec::new();
        for lane in 0..session.lanes().len() {
            let Some((target, _remaining)) = session.answerable(lane) else {
                continue;
            };
            if self.decided.contains(&target.id) || clock < target.time_ms + self.offset_ms {
                continue;
            }
            self.decided.insert(target.id);
            self.seen += 1;
            if self.miss_every.is_some_and(|n| self.seen % n == 0) {
                continue;
            }
            notes.extend(
                target
                    .chord
                    .display_notes()
                    .into_iter()
                    .map(|note| InputEvent::new(note as i32, now_ms)),
            );
        }
        notes
    }
}
