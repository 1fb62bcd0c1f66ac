use fantasia_domain::{
    DamageRange, EngineEvent, HitGrade, LaneId, StageConfig, TargetEvent,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::matcher::InputAccumulator;
use crate::scheduler::LaneState;

/// One concurrently judgeable target slot (an enemy on screen).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Lane {
    pub id: LaneId,
    pub hp: u32,
    pub max_hp: u32,
    pub defeated_count: u32,
    pub accumulator: InputAccumulator,
    pub state: LaneState,
}

impl Lane {
    pub fn new(id: LaneId, max_hp: u32, state: LaneState) -> Self {
        Self {
            id,
            hp: max_hp,
            max_hp,
            defeated_count: 0,
            accumulator: InputAccumulator::default(),
            state,
        }
    }

    pub fn is_retired(&self) -> bool {
        matches!(self.state, LaneState::Retired)
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self.state, LaneState::Exhausted)
    }
}

/// Owns lane HP, the queue of enemies waiting for a lane, and damage rolls.
pub struct LaneManager {
    lanes: Vec<Lane>,
    backlog: usize,
    endless: bool,
    damage: DamageRange,
    combo_step: u32,
    combo_bonus: u32,
    miss_damage: u32,
    rng: StdRng,
}

impl LaneManager {
    pub fn new<F>(stage: &StageConfig, initial_state: F) -> Self
    where
        F: Fn(LaneId) -> LaneState,
    {
        let lanes = (0..stage.simultaneous_lanes)
            .map(|id| Lane::new(id, stage.lane_hp, initial_state(id)))
            .collect();
        let rng = match stage.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let damage = stage.damage_range();
        Self {
            lanes,
            backlog: stage.backlog(),
            endless: stage.enemy_count == 0,
            damage: DamageRange {
                min: damage.min.min(damage.max),
                max: damage.min.max(damage.max),
            },
            combo_step: stage.combo_step,
            combo_bonus: stage.combo_bonus,
            miss_damage: stage.miss_damage,
            rng,
        }
    }

    pub fn lanes(&self) -> &[Lane] {
        &self.lanes
    }

    pub fn lanes_mut(&mut self) -> &mut [Lane] {
        &mut self.lanes
    }

    pub fn lane(&self, id: LaneId) -> Option<&Lane> {
        self.lanes.get(id)
    }

    pub fn backlog(&self) -> usize {
        self.backlog
    }

    /// Every enemy has been defeated and nothing is queued.
    pub fn all_defeated(&self) -> bool {
        !self.endless && self.backlog == 0 && self.lanes.iter().all(Lane::is_retired)
    }

    /// No lane has anything left to judge.
    pub fn all_idle(&self) -> bool {
        self.lanes
            .iter()
            .all(|lane| lane.is_retired() || lane.is_exhausted())
    }

    /// Base roll within the configured range plus the combo bonus.
    pub fn roll_damage(&mut self, combo: u32) -> u32 {
        let base = self.rng.random_range(self.damage.min..=self.damage.max);
        let bonus = match self.combo_step {
            0 => 0,
            step => (combo / step).saturating_mul(self.combo_bonus),
        };
        base.saturating_add(bonus)
    }

    pub fn apply_hit(
        &mut self,
        lane: LaneId,
        target: &TargetEvent,
        grade: HitGrade,
        combo: u32,
        events: &mut Vec<EngineEvent>,
    ) {
        let damage = self.roll_damage(combo);
        let Some(slot) = self.lanes.get_mut(lane) else {
            return;
        };
        slot.hp = slot.hp.saturating_sub(damage);
        slot.accumulator.clear();
        let defeated = slot.hp == 0;
        events.push(EngineEvent::Hit {
            lane,
            target_id: target.id,
            chord: target.chord.clone(),
            damage,
            grade,
            defeated,
        });
        if !defeated {
            return;
        }
        slot.defeated_count += 1;
        events.push(EngineEvent::Defeated {
            lane,
            defeated_count: slot.defeated_count,
        });
        if self.endless || self.backlog > 0 {
            if !self.endless {
                self.backlog -= 1;
            }
            slot.hp = slot.max_hp;
            debug!(lane, backlog = self.backlog, "next enemy takes the lane");
            events.push(EngineEvent::Respawned { lane, hp: slot.hp });
        } else {
            info!(lane, "lane retired");
            slot.state = LaneState::Retired;
        }
    }

    /// A missed target hurts the player, never the lane.
    pub fn apply_timeout(
        &mut self,
        lane: LaneId,
        target: &TargetEvent,
        global_hp: &mut u32,
        events: &mut Vec<EngineEvent>,
    ) {
        if let Some(slot) = self.lanes.get_mut(lane) {
            slot.accumulator.clear();
        }
        let amount = self.miss_damage.min(*global_hp);
        *global_hp -= amount;
        events.push(EngineEvent::Miss {
            lane,
            target_id: target.id,
            chord: target.chord.clone(),
        });
        events.push(EngineEvent::PlayerDamaged {
            amount,
            remaining: *global_hp,
        });
    }

    /// Drops every window and accumulator; used when a session is stopped.
    pub fn clear(&mut self) {
        for lane in &mut self.lanes {
            lane.accumulator.clear();
            lane.state = LaneState::Retired;
        }
        self.backlog = 0;
    }
}
