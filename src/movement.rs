use rand::Rng;
use std::collections::HashSet;
use std::time::Duration;

use crate::error::MovementError;
use crate::events::{Outbound, Outbox};
use crate::map::WorldMap;
use crate::pathfinding::find_path;
use crate::registry::Registry;
use crate::types::{animation_tag, ChatMessage, Direction, GridPosition, MoveTarget, PlayerData, PlayerUpdate, Position};

/// How a movement ended; reported once per `initiate`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MovementOutcome {
    Arrived,
    Failed(MovementError),
}

#[derive(Debug, Clone)]
struct Blocker {
    username: String,
    blocked_for: Duration,
    asked_to_move: bool,
}

#[derive(Debug, Clone, Copy)]
struct Recalculation {
    avoid_players: bool,
}

/// Steps one agent along a grid path, one tick at a time.
///
/// Outcomes are one-shot: after `Arrived` or `Failed` is returned the
/// controller stays quiet until the next `initiate`.
#[derive(Debug)]
pub struct MovementController {
    speed: f64,
    give_up_after: Duration,
    arrival_epsilon: f64,
    path: Vec<GridPosition>,
    path_index: usize,
    target: Option<GridPosition>,
    blocker: Option<Blocker>,
    recalculation: Option<Recalculation>,
    paused: bool,
    completed: bool,
    notify: bool,
    direction: Direction,
}

impl MovementController {
    pub fn new(speed: f64, give_up_after: Duration, arrival_epsilon: f64) -> Self {
        Self {
            speed,
            give_up_after,
            arrival_epsilon,
            path: Vec::new(),
            path_index: 0,
            target: None,
            blocker: None,
            recalculation: None,
            paused: false,
            completed: false,
            notify: false,
            direction: Direction::Down,
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn is_moving(&self) -> bool {
        !self.paused && self.path_index < self.path.len()
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn target(&self) -> Option<GridPosition> {
        self.target
    }

    pub fn blocked_by(&self) -> Option<&str> {
        self.blocker.as_ref().map(|b| b.username.as_str())
    }

    /// Resolve a move target to a cell and start walking there
    pub fn initiate(
        &mut self,
        target: &MoveTarget,
        me: &PlayerData,
        world: &Registry,
        rng: &mut impl Rng,
    ) -> Result<(), MovementError> {
        let map = world.map();
        let goal = match target {
            MoveTarget::Coordinates { x, y } => map.world_to_grid(Position::new(*x, *y)),
            MoveTarget::Person { name } => {
                let person = world
                    .find_by_username(name)
                    .ok_or_else(|| MovementError::UnknownPerson(name.clone()))?;
                adjacent_free_cell(map, world, me, person)?
            }
            MoveTarget::Place { name } => {
                let place = map
                    .place(name)
                    .ok_or_else(|| MovementError::UnknownPlace(name.clone()))?;
                let cell = map.world_to_grid(place.random_point(rng));
                if map.is_walkable(cell) {
                    cell
                } else {
                    let cells = map.cells_in(place);
                    if cells.is_empty() {
                        return Err(MovementError::NoPath);
                    }
                    cells[rng.gen_range(0..cells.len())]
                }
            }
        };
        self.walk_to(goal, me, map)
    }

    /// Plan a path to `goal` ignoring other players and arm the outcome
    pub fn walk_to(&mut self, goal: GridPosition, me: &PlayerData, map: &WorldMap) -> Result<(), MovementError> {
        let start = map.world_to_grid(me.position());
        let path = find_path(map, start, goal, &HashSet::new()).ok_or(MovementError::NoPath)?;
        self.target = Some(goal);
        self.notify = true;
        self.paused = false;
        self.recalculation = None;
        self.set_path(path, me, map);
        Ok(())
    }

    /// Adopt a new path, resuming from the tile after the one closest to us
    pub fn set_path(&mut self, path: Vec<GridPosition>, me: &PlayerData, map: &WorldMap) {
        let here = me.position();
        let closest = path
            .iter()
            .enumerate()
            .map(|(idx, cell)| (idx, map.grid_to_world(*cell).distance(&here)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(idx, _)| idx)
            .unwrap_or(0);
        self.path = path;
        self.path_index = closest + 1;
        self.blocker = None;
        self.completed = false;
    }

    /// Drop the path and any pending outcome
    pub fn stop(&mut self) {
        self.path.clear();
        self.path_index = 0;
        self.target = None;
        self.blocker = None;
        self.recalculation = None;
        self.notify = false;
    }

    pub fn pause(&mut self, me: &PlayerData, out: &mut Outbox) {
        self.paused = true;
        self.show_idle(me, out);
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    /// Turn to look at `position` without moving
    pub fn face_towards(&mut self, me: &PlayerData, position: Position, out: &mut Outbox) {
        let here = me.position();
        self.direction = Direction::from_delta(position.x - here.x, position.y - here.y);
        self.show_idle(me, out);
    }

    /// Advance by `dt`. Position and animation changes are queued on `out`,
    /// along with at most one "please move" message per blocking episode.
    pub fn tick(
        &mut self,
        dt: Duration,
        me: &PlayerData,
        world: &Registry,
        out: &mut Outbox,
    ) -> Option<MovementOutcome> {
        let map = world.map();

        if let Some(request) = self.recalculation.take() {
            if let Some(outcome) = self.recalculate(request, me, world) {
                self.show_idle(me, out);
                return Some(outcome);
            }
        }

        if self.paused {
            self.show_idle(me, out);
            return None;
        }

        if self.path_index >= self.path.len() {
            self.show_idle(me, out);
            if self.target.is_some() && !self.completed {
                return self.complete();
            }
            return None;
        }

        let next = self.path[self.path_index];
        let occupant = world
            .others(&me.id)
            .find(|other| map.world_to_grid(other.position()) == next);
        if let Some(occupant) = occupant {
            let username = occupant.username.clone();
            return self.blocked_by_player(username, dt, me, out);
        }
        if !map.is_walkable(next) {
            self.recalculation = Some(Recalculation { avoid_players: false });
            self.show_idle(me, out);
            return None;
        }
        self.blocker = None;

        let here = me.position();
        let goal = map.grid_to_world(next);
        let dx = goal.x - here.x;
        let dy = goal.y - here.y;
        let distance = dx.hypot(dy);
        let step = self.speed * dt.as_secs_f64();

        let reached = step >= distance || distance <= self.arrival_epsilon;
        let position = if reached {
            goal
        } else {
            Position::new(here.x + dx / distance * step, here.y + dy / distance * step)
        };
        if distance > 0.0 {
            self.direction = Direction::from_delta(dx, dy);
        }
        let animation = animation_tag(&me.username, true, self.direction);
        out.update_player(PlayerUpdate {
            x: Some(position.x),
            y: Some(position.y),
            animation: (animation != me.animation).then_some(animation),
            action: None,
        });

        if reached {
            self.path_index += 1;
            if self.path_index >= self.path.len() {
                return self.complete();
            }
        }
        None
    }

    fn blocked_by_player(
        &mut self,
        username: String,
        dt: Duration,
        me: &PlayerData,
        out: &mut Outbox,
    ) -> Option<MovementOutcome> {
        match &mut self.blocker {
            Some(blocker) if blocker.username == username => blocker.blocked_for += dt,
            _ => {
                log::debug!("{} is blocked by {}", me.username, username);
                self.blocker = Some(Blocker {
                    username,
                    blocked_for: Duration::ZERO,
                    asked_to_move: false,
                });
                self.recalculation = Some(Recalculation { avoid_players: true });
            }
        }

        let blocker = self.blocker.as_mut()?;
        if blocker.blocked_for >= self.give_up_after {
            let who = blocker.username.clone();
            log::info!("🚧 {} gave up waiting for {}", me.username, who);
            self.show_idle(me, out);
            return self.fail(MovementError::GaveUp(who));
        }
        if !blocker.asked_to_move {
            blocker.asked_to_move = true;
            out.push(Outbound::SendMessage(ChatMessage::new(
                me.username.clone(),
                blocker.username.clone(),
                format!("Hey {}, you're blocking my path.", blocker.username),
            )));
        }
        self.show_idle(me, out);
        None
    }

    fn recalculate(&mut self, request: Recalculation, me: &PlayerData, world: &Registry) -> Option<MovementOutcome> {
        let map = world.map();
        let goal = self.target?;
        let blocked: HashSet<GridPosition> = if request.avoid_players {
            world
                .others(&me.id)
                .map(|other| map.world_to_grid(other.position()))
                .collect()
        } else {
            HashSet::new()
        };
        let start = map.world_to_grid(me.position());
        match find_path(map, start, goal, &blocked) {
            Some(path) => {
                log::debug!("{} found a new path ({} tiles)", me.username, path.len());
                self.set_path(path, me, map);
                None
            }
            None if request.avoid_players => {
                log::debug!("{} has no way around, waiting", me.username);
                None
            }
            None => self.fail(MovementError::NoPath),
        }
    }

    fn complete(&mut self) -> Option<MovementOutcome> {
        self.completed = true;
        self.blocker = None;
        if std::mem::take(&mut self.notify) {
            Some(MovementOutcome::Arrived)
        } else {
            None
        }
    }

    fn fail(&mut self, error: MovementError) -> Option<MovementOutcome> {
        let notify = self.notify;
        self.stop();
        notify.then_some(MovementOutcome::Failed(error))
    }

    fn show_idle(&self, me: &PlayerData, out: &mut Outbox) {
        let animation = animation_tag(&me.username, false, self.direction);
        if animation != me.animation {
            out.update_player(PlayerUpdate::animation(animation));
        }
    }
}

/// Free walkable cell next to `person`, closest to `me`
fn adjacent_free_cell(
    map: &WorldMap,
    world: &Registry,
    me: &PlayerData,
    person: &PlayerData,
) -> Result<GridPosition, MovementError> {
    let mine = map.world_to_grid(me.position());
    let occupied: HashSet<GridPosition> = world
        .others(&me.id)
        .map(|other| map.world_to_grid(other.position()))
        .collect();
    let here = me.position();
    map.world_to_grid(person.position())
        .neighbours()
        .into_iter()
        .filter(|cell| map.is_walkable(*cell) && (*cell == mine || !occupied.contains(cell)))
        .min_by(|a, b| {
            map.grid_to_world(*a)
                .distance(&here)
                .total_cmp(&map.grid_to_world(*b).distance(&here))
        })
        .ok_or_else(|| MovementError::NoAdjacentCell(person.username.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::Place;
    use crate::types::PlayerId;
    use std::sync::Arc;

    const DT: Duration = Duration::from_millis(100);

    fn corridor() -> WorldMap {
        // 8x3 map whose middle row is the only open corridor
        let walls = (0..8).flat_map(|x| [GridPosition::new(x, 0), GridPosition::new(x, 2)]);
        WorldMap::new(8, 3, 16.0, vec![Place::new("spawn", 0.0, 16.0, 128.0, 16.0)], "spawn")
            .with_walls(walls)
    }

    fn walker(world: &mut Registry, cell: GridPosition) -> PlayerData {
        let position = world.map().grid_to_world(cell);
        let me = PlayerData::new(PlayerId::new("npc-1"), "ann", true, position);
        world.insert(me.clone());
        me
    }

    fn apply(me: &mut PlayerData, world: &mut Registry, out: &mut Outbox) {
        for event in out.drain() {
            if let Outbound::UpdatePlayerData(update) = event {
                me.apply(&update);
                world.apply_update(&me.id, &update);
            }
        }
    }

    #[test]
    fn walks_to_goal_and_reports_arrival_once() {
        let mut world = Registry::new(Arc::new(corridor()));
        let mut me = walker(&mut world, GridPosition::new(0, 1));
        let mut movement = MovementController::new(50.0, Duration::from_secs(5), 1.0);
        movement.walk_to(GridPosition::new(3, 1), &me, world.map()).unwrap();

        let mut arrivals = 0;
        for _ in 0..40 {
            let mut out = Outbox::new();
            if let Some(outcome) = movement.tick(DT, &me, &world, &mut out) {
                assert_eq!(outcome, MovementOutcome::Arrived);
                arrivals += 1;
            }
            apply(&mut me, &mut world, &mut out);
        }
        assert_eq!(arrivals, 1);
        assert_eq!(me.position(), world.map().grid_to_world(GridPosition::new(3, 1)));
        assert_eq!(me.animation, "ann-idle-right");
    }

    #[test]
    fn gives_up_exactly_once_after_being_blocked() {
        let mut world = Registry::new(Arc::new(corridor()));
        let mut me = walker(&mut world, GridPosition::new(0, 1));
        let blocker_pos = world.map().grid_to_world(GridPosition::new(1, 1));
        world.insert(PlayerData::new(PlayerId::new("p-2"), "bob", false, blocker_pos));

        let mut movement = MovementController::new(50.0, Duration::from_secs(5), 1.0);
        movement.walk_to(GridPosition::new(5, 1), &me, world.map()).unwrap();

        let mut please_move = 0;
        let mut failures = Vec::new();
        for tick in 1..=80 {
            if tick == 30 {
                assert_eq!(movement.blocked_by(), Some("bob"));
            }
            let mut out = Outbox::new();
            if let Some(outcome) = movement.tick(DT, &me, &world, &mut out) {
                failures.push((tick, outcome));
            }
            please_move += out
                .iter()
                .filter(|event| matches!(event, Outbound::SendMessage(_)))
                .count();
            apply(&mut me, &mut world, &mut out);
        }

        assert_eq!(please_move, 1);
        assert_eq!(failures.len(), 1);
        let (tick, outcome) = &failures[0];
        // first sighting at tick 1, then 50 more ticks of 100ms
        assert_eq!(*tick, 51);
        assert_eq!(*outcome, MovementOutcome::Failed(MovementError::GaveUp("bob".into())));
        assert!(!movement.is_moving());
    }

    #[test]
    fn steps_around_a_player_when_there_is_room() {
        let map = WorldMap::new(5, 5, 16.0, vec![Place::new("spawn", 0.0, 0.0, 80.0, 80.0)], "spawn");
        let mut world = Registry::new(Arc::new(map));
        let mut me = walker(&mut world, GridPosition::new(0, 2));
        let blocker_pos = world.map().grid_to_world(GridPosition::new(1, 2));
        world.insert(PlayerData::new(PlayerId::new("p-2"), "bob", false, blocker_pos));

        let mut movement = MovementController::new(50.0, Duration::from_secs(5), 1.0);
        movement.walk_to(GridPosition::new(4, 2), &me, world.map()).unwrap();

        let mut arrived = false;
        for _ in 0..100 {
            let mut out = Outbox::new();
            if movement.tick(DT, &me, &world, &mut out) == Some(MovementOutcome::Arrived) {
                arrived = true;
            }
            apply(&mut me, &mut world, &mut out);
        }
        assert!(arrived);
    }

    #[test]
    fn person_target_picks_free_neighbour() {
        let map = WorldMap::new(5, 5, 16.0, vec![Place::new("spawn", 0.0, 0.0, 80.0, 80.0)], "spawn");
        let mut world = Registry::new(Arc::new(map));
        let me = walker(&mut world, GridPosition::new(0, 2));
        let bob_pos = world.map().grid_to_world(GridPosition::new(3, 2));
        world.insert(PlayerData::new(PlayerId::new("p-2"), "bob", false, bob_pos));

        let mut movement = MovementController::new(50.0, Duration::from_secs(5), 1.0);
        let mut rng = rand::thread_rng();
        movement
            .initiate(&MoveTarget::person("bob"), &me, &world, &mut rng)
            .unwrap();
        assert_eq!(movement.target(), Some(GridPosition::new(2, 2)));

        let err = movement
            .initiate(&MoveTarget::person("nobody"), &me, &world, &mut rng)
            .unwrap_err();
        assert_eq!(err, MovementError::UnknownPerson("nobody".into()));
    }
}
