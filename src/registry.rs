use anyhow::{anyhow, Result};
use rand::Rng;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use crate::map::WorldMap;
use crate::types::{
    ChatMessage, GridPosition, NewsItem, PlayerData, PlayerId, PlayerUpdate, Position,
    VoteCandidate,
};

/// Canonical set of live players and agents in one room, plus the room's
/// shared state: newspaper, vote rounds and published reflections.
///
/// Only the engine mutates it, one event at a time.
#[derive(Debug)]
pub struct Registry {
    map: Arc<WorldMap>,
    players: BTreeMap<PlayerId, PlayerData>,
    newspaper: Vec<NewsItem>,
    vote_rounds: Vec<HashMap<String, VoteCandidate>>,
    reflections: HashMap<PlayerId, Vec<String>>,
}

impl Registry {
    pub fn new(map: Arc<WorldMap>) -> Self {
        Self {
            map,
            players: BTreeMap::new(),
            newspaper: Vec::new(),
            vote_rounds: vec![HashMap::new()],
            reflections: HashMap::new(),
        }
    }

    pub fn map(&self) -> &WorldMap {
        &self.map
    }

    /// Insert or replace the entry for `player.id`
    pub fn insert(&mut self, player: PlayerData) {
        log::debug!("Registry: {} ({}) joined", player.username, player.id);
        self.players.insert(player.id.clone(), player);
    }

    pub fn remove(&mut self, id: &PlayerId) -> Option<PlayerData> {
        self.reflections.remove(id);
        self.players.remove(id)
    }

    pub fn get(&self, id: &PlayerId) -> Option<&PlayerData> {
        self.players.get(id)
    }

    pub fn contains(&self, id: &PlayerId) -> bool {
        self.players.contains_key(id)
    }

    pub fn apply_update(&mut self, id: &PlayerId, update: &PlayerUpdate) -> Option<&PlayerData> {
        let player = self.players.get_mut(id)?;
        player.apply(update);
        Some(player)
    }

    pub fn players(&self) -> impl Iterator<Item = &PlayerData> {
        self.players.values()
    }

    /// Everyone except `id`
    pub fn others<'a>(&'a self, id: &'a PlayerId) -> impl Iterator<Item = &'a PlayerData> + 'a {
        self.players.values().filter(move |p| &p.id != id)
    }

    pub fn find_by_username(&self, username: &str) -> Option<&PlayerData> {
        self.players.values().find(|p| p.username == username)
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Players within `range` of `position`, Euclidean
    pub fn within_range(&self, position: Position, range: f64) -> impl Iterator<Item = &PlayerData> {
        self.players
            .values()
            .filter(move |p| p.position().distance(&position) <= range)
    }

    /// Who overhears `message`: anyone but the two speakers standing within
    /// `range` of either of them
    pub fn overhearers(&self, message: &ChatMessage, range: f64) -> Vec<PlayerId> {
        let mut heard: BTreeSet<PlayerId> = BTreeSet::new();
        for anchor in [&message.from, &message.to]
            .into_iter()
            .filter_map(|name| self.find_by_username(name))
        {
            heard.extend(
                self.within_range(anchor.position(), range)
                    .filter(|p| p.username != message.from && p.username != message.to)
                    .map(|p| p.id.clone()),
            );
        }
        heard.into_iter().collect()
    }

    /// Players standing inside the named place; empty for unknown places
    pub fn in_place(&self, place: &str) -> Vec<&PlayerData> {
        let Some(zone) = self.map.place(place) else {
            return Vec::new();
        };
        self.players
            .values()
            .filter(|p| zone.contains(&p.position()))
            .collect()
    }

    pub fn is_cell_occupied(&self, cell: GridPosition) -> bool {
        self.players
            .values()
            .any(|p| self.map.world_to_grid(p.position()) == cell)
    }

    /// Uniform pick among the free walkable cells of the spawn place
    pub fn spawn_position(&self, rng: &mut impl Rng) -> Result<Position> {
        let area = self.map.spawn_area()?;
        let free: Vec<GridPosition> = self
            .map
            .cells_in(area)
            .into_iter()
            .filter(|cell| !self.is_cell_occupied(*cell))
            .collect();
        if free.is_empty() {
            return Err(anyhow!("no free cell left in spawn place {:?}", area.name));
        }
        Ok(self.map.grid_to_world(free[rng.gen_range(0..free.len())]))
    }

    pub fn newspaper(&self) -> &[NewsItem] {
        &self.newspaper
    }

    pub fn add_news(&mut self, item: NewsItem) {
        log::info!("📰 {}", item.message);
        self.newspaper.push(item);
    }

    /// Record `username`'s ballot in the open round; a second vote replaces the first
    pub fn record_vote(&mut self, username: &str, candidate: VoteCandidate) {
        if let Some(round) = self.vote_rounds.last_mut() {
            round.insert(username.to_string(), candidate);
        }
    }

    pub fn vote_rounds(&self) -> &[HashMap<String, VoteCandidate>] {
        &self.vote_rounds
    }

    /// Close the open round and start a new one. Returns the closed round's tally.
    pub fn finish_voting(&mut self) -> BTreeMap<VoteCandidate, usize> {
        let mut tally = BTreeMap::new();
        if let Some(round) = self.vote_rounds.last() {
            for candidate in round.values() {
                *tally.entry(candidate.clone()).or_insert(0) += 1;
            }
        }
        log::info!("🗳️ Voting round {} closed: {:?}", self.vote_rounds.len(), tally);
        self.vote_rounds.push(HashMap::new());
        tally
    }

    pub fn set_reflections(&mut self, id: &PlayerId, reflections: Vec<String>) {
        if self.players.contains_key(id) {
            self.reflections.insert(id.clone(), reflections);
        }
    }

    pub fn reflections(&self, id: &PlayerId) -> Option<&[String]> {
        self.reflections.get(id).map(Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::Place;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn map() -> Arc<WorldMap> {
        Arc::new(WorldMap::new(
            10,
            10,
            16.0,
            vec![
                Place::new("spawn", 0.0, 0.0, 32.0, 32.0),
                Place::new("Town Square", 80.0, 80.0, 64.0, 64.0),
            ],
            "spawn",
        ))
    }

    fn player(id: &str, name: &str, x: f64, y: f64) -> PlayerData {
        PlayerData::new(PlayerId::new(id), name, true, Position::new(x, y))
    }

    #[test]
    fn one_entry_per_identity() {
        let mut world = Registry::new(map());
        world.insert(player("a", "ann", 8.0, 16.0));
        world.insert(player("a", "ann", 24.0, 16.0));
        assert_eq!(world.len(), 1);
        assert_eq!(world.get(&PlayerId::new("a")).unwrap().x, 24.0);

        world.set_reflections(&PlayerId::new("a"), vec!["hi".into()]);
        assert!(world.remove(&PlayerId::new("a")).is_some());
        assert!(world.is_empty());
        assert!(world.reflections(&PlayerId::new("a")).is_none());
    }

    #[test]
    fn overhearing_covers_both_speakers() {
        let mut world = Registry::new(map());
        world.insert(player("a", "ann", 0.0, 0.0));
        world.insert(player("b", "bob", 100.0, 0.0));
        world.insert(player("c", "cat", 20.0, 0.0));
        world.insert(player("d", "dan", 110.0, 10.0));
        world.insert(player("e", "eve", 50.0, 0.0));

        let message = ChatMessage::new("ann", "bob", "hello");
        let mut heard = world.overhearers(&message, 30.0);
        heard.sort();
        assert_eq!(heard, vec![PlayerId::new("c"), PlayerId::new("d")]);
    }

    #[test]
    fn zone_membership_uses_place_bounds() {
        let mut world = Registry::new(map());
        world.insert(player("a", "ann", 100.0, 100.0));
        world.insert(player("b", "bob", 10.0, 10.0));
        let inside: Vec<_> = world.in_place("Town Square").iter().map(|p| p.username.clone()).collect();
        assert_eq!(inside, vec!["ann"]);
        assert!(world.in_place("Nowhere").is_empty());
    }

    #[test]
    fn spawn_avoids_occupied_cells() {
        let mut world = Registry::new(map());
        let mut rng = StdRng::seed_from_u64(1);
        // spawn place covers four cells; fill three of them
        let cells = world.map().cells_in(world.map().spawn_area().unwrap());
        assert_eq!(cells.len(), 4);
        for (i, cell) in cells.iter().take(3).enumerate() {
            let pos = world.map().grid_to_world(*cell);
            world.insert(player(&format!("p{}", i), &format!("p{}", i), pos.x, pos.y));
        }
        let free = world.map().grid_to_world(cells[3]);
        for _ in 0..10 {
            assert_eq!(world.spawn_position(&mut rng).unwrap(), free);
        }

        world.insert(player("p3", "p3", free.x, free.y));
        assert!(world.spawn_position(&mut rng).is_err());
    }

    #[test]
    fn vote_rounds_tally_and_reset() {
        let mut world = Registry::new(map());
        world.record_vote("ann", "Alex Morgan".into());
        world.record_vote("bob", "Alex Morgan".into());
        world.record_vote("cat", "Jordan Reyes".into());
        world.record_vote("cat", "Alex Morgan".into());

        let tally = world.finish_voting();
        assert_eq!(tally.get("Alex Morgan"), Some(&3));
        assert_eq!(tally.get("Jordan Reyes"), None);
        assert_eq!(world.vote_rounds().len(), 2);
        assert!(world.vote_rounds()[1].is_empty());
    }
}
