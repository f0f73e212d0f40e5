//! End-to-end town scenarios
//!
//! Agents run inside an `Engine` with a scripted planner/reflector and a
//! canned LLM. No tokio runtime is running, so oracle calls resolve inline
//! and every run is deterministic.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

use social_town::action::TIMEOUT_MESSAGE;
use social_town::llm::{ChatRequest, Completion, LlmClient};
use social_town::types::{GridPosition, NewsKind};
use social_town::{
    Action, ActionDigest, BrainDump, ChatMessage, Config, Delivery, Engine, Inbound, Outbound,
    Place, Planner, PlayerId, Position, Reflector, Services, WorldMap,
};

const FRAME: Duration = Duration::from_millis(100);

/// Hands out plans in order, then empty plans; records every reflection
#[derive(Default)]
struct Mind {
    plans: Mutex<VecDeque<&'static str>>,
    digests: Mutex<Vec<ActionDigest>>,
}

impl Mind {
    fn new(plans: &[&'static str]) -> Arc<Self> {
        Arc::new(Self {
            plans: Mutex::new(plans.iter().copied().collect()),
            digests: Mutex::new(Vec::new()),
        })
    }

    fn digests(&self) -> Vec<ActionDigest> {
        self.digests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Planner for Mind {
    async fn plan(&self, _dump: BrainDump) -> Result<Vec<Action>> {
        let next = self.plans.lock().unwrap().pop_front();
        match next {
            Some(json) => Ok(serde_json::from_str(json)?),
            None => Ok(Vec::new()),
        }
    }
}

#[async_trait]
impl Reflector for Mind {
    async fn reflect(&self, _dump: BrainDump, digest: ActionDigest) -> Result<String> {
        let line = format!("{:?}", digest);
        self.digests.lock().unwrap().push(digest);
        Ok(line)
    }

    async fn summarize_reflections(&self, _dump: BrainDump) -> Result<String> {
        Ok("A long day.".to_string())
    }
}

/// Same answer to every request
struct Canned {
    answer: &'static str,
    calls: AtomicUsize,
}

impl Canned {
    fn new(answer: &'static str) -> Arc<Self> {
        Arc::new(Self {
            answer,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmClient for Canned {
    async fn complete(&self, _request: ChatRequest) -> Result<Completion> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Completion::Text(self.answer.to_string()))
    }
}

fn town(map: WorldMap, llm: Arc<Canned>, mind: &Arc<Mind>) -> Engine {
    let services = Services::new(Config::default(), llm)
        .with_planner(mind.clone())
        .with_reflector(mind.clone());
    Engine::with_services(services, map)
}

/// 10x3 map whose middle row is the only way through
fn corridor() -> WorldMap {
    let walls = (0..10).flat_map(|x| [GridPosition::new(x, 0), GridPosition::new(x, 2)]);
    WorldMap::new(
        10,
        3,
        16.0,
        vec![
            Place::new("Hall", 0.0, 16.0, 32.0, 16.0),
            Place::new("Far End", 128.0, 16.0, 32.0, 16.0),
        ],
        "Hall",
    )
    .with_walls(walls)
}

fn square() -> WorldMap {
    WorldMap::new(
        16,
        16,
        16.0,
        vec![
            Place::new("Spawn", 0.0, 0.0, 64.0, 64.0),
            Place::new("Town Square", 96.0, 96.0, 64.0, 64.0),
            Place::new("Town Hall", 192.0, 32.0, 48.0, 48.0),
        ],
        "Spawn",
    )
}

fn at(engine: &Engine, x: i32, y: i32) -> Position {
    engine.registry().map().grid_to_world(GridPosition::new(x, y))
}

fn drain(rx: &mut UnboundedReceiver<Delivery>) -> Vec<Delivery> {
    std::iter::from_fn(|| rx.try_recv().ok()).collect()
}

#[test]
fn blocked_agent_gives_up_once_and_reflects_on_it() {
    let mind = Mind::new(&[
        r#"[{"type": "idle", "activityType": "read"}]"#,
        r#"[{"type": "move", "target": {"targetType": "place", "name": "Far End"}}]"#,
    ]);
    let mut engine = town(corridor(), Canned::new("unused"), &mind);
    let mut rx = engine.subscribe();
    let ann = engine.spawn_agent_at("Ann", "A retired librarian.", at(&engine, 0, 1)).unwrap();
    let harry_at = at(&engine, 2, 1);
    engine.join_at(PlayerId::new("harry"), "harry", harry_at).unwrap();
    drain(&mut rx);

    let mut asked_at = Vec::new();
    let mut gave_up_at = None;
    for tick in 1..=300 {
        engine.tick(FRAME);
        for delivery in drain(&mut rx) {
            if let Inbound::NewMessage(message) = &delivery.event {
                if message.from == "Ann" && message.message.contains("blocking my path") {
                    asked_at.push(tick);
                }
            }
        }
        let gave_up = mind
            .digests()
            .iter()
            .any(|d| matches!(d, ActionDigest::Move { gave_up: true, .. }));
        if gave_up && gave_up_at.is_none() {
            gave_up_at = Some(tick);
        }
    }

    assert_eq!(asked_at.len(), 1, "asked to move more than once: {:?}", asked_at);
    let gave_up_at = gave_up_at.expect("move was never given up");
    assert!(gave_up_at - asked_at[0] >= 50, "gave up after {} ticks", gave_up_at - asked_at[0]);

    let digests = mind.digests();
    assert_eq!(digests.len(), 2, "{:?}", digests);
    assert!(matches!(&digests[0], ActionDigest::Idle { interrupted: false, .. }));
    assert!(matches!(
        &digests[1],
        ActionDigest::Move { gave_up: true, interrupted: false, .. }
    ));
    assert_eq!(engine.registry().reflections(&ann).map(<[String]>::len), Some(2));

    let position = engine.agent("Ann").unwrap().player().position();
    assert!(position.x < harry_at.x);
}

#[test]
fn human_gets_one_reply_per_burst_then_a_timeout() {
    let mind = Mind::new(&[]);
    let llm = Canned::new("Hello harry. Lovely day.");
    let mut engine = town(square(), llm.clone(), &mind);
    let mut rx = engine.subscribe();
    engine.spawn_agent_at("Ann", "A retired librarian.", at(&engine, 2, 2)).unwrap();
    let harry = PlayerId::new("harry");
    engine.join_at(harry.clone(), "harry", at(&engine, 3, 2)).unwrap();
    drain(&mut rx);

    let say = |text: &str| Outbound::SendMessage(ChatMessage::new("harry", "Ann", text));
    engine.submit(&harry, say("Hi Ann"));
    engine.tick(FRAME);
    engine.submit(&harry, say("How are you?"));

    let mut replies = Vec::new();
    let mut endings = Vec::new();
    for tick in 2..=250 {
        engine.tick(FRAME);
        for delivery in drain(&mut rx) {
            match delivery.event {
                Inbound::NewMessage(m) if delivery.to == harry => replies.push((tick, m.message)),
                Inbound::EndConversation(m) if delivery.to == harry => endings.push((tick, m.message)),
                _ => {}
            }
        }
    }

    assert_eq!(llm.calls(), 1);
    let texts: Vec<&str> = replies.iter().map(|(_, text)| text.as_str()).collect();
    assert_eq!(texts, vec!["Hello harry.", "Lovely day."]);
    // the second message restarted the quiet period
    assert!(replies[0].0 >= 31, "replied at tick {}", replies[0].0);

    assert_eq!(endings.len(), 1);
    assert_eq!(endings[0].1, TIMEOUT_MESSAGE);
    assert!(endings[0].0 - replies[1].0 >= 150);

    let digests = mind.digests();
    assert!(matches!(
        digests.first(),
        Some(ActionDigest::Talk { counterpart, transcript, .. })
            if counterpart == "harry" && transcript.contains("How are you?")
    ));
}

#[test]
fn agent_walks_to_the_hall_and_votes() {
    let mind = Mind::new(&[r#"[{"type": "vote", "reasonWhy": "civic duty"}]"#]);
    let mut engine = town(square(), Canned::new(r#"{"candidate": "Jordan Reyes"}"#), &mind);
    let mut rx = engine.subscribe();
    engine.spawn_agent_at("Ann", "A retired librarian.", at(&engine, 1, 1)).unwrap();
    engine.join_at(PlayerId::new("harry"), "harry", at(&engine, 0, 0)).unwrap();
    drain(&mut rx);

    let mut news = Vec::new();
    for _ in 0..300 {
        engine.tick(FRAME);
        for delivery in drain(&mut rx) {
            if let Inbound::News(items) = delivery.event {
                news.extend(items);
            }
        }
    }

    let hall = engine.registry().map().place("Town Hall").unwrap().clone();
    let ann = engine.agent("Ann").unwrap();
    let distance_to_hall = ann
        .player()
        .position()
        .distance(&Position::new(hall.x + hall.width / 2.0, hall.y + hall.height / 2.0));
    assert!(distance_to_hall < 48.0);

    assert!(news
        .iter()
        .any(|n| n.kind == NewsKind::Vote { voter: "Ann".to_string() }));
    let tally = engine.finish_voting();
    assert_eq!(tally.get("Jordan Reyes"), Some(&1));
    assert!(engine.finish_voting().is_empty());
    assert!(matches!(mind.digests().first(), Some(ActionDigest::Vote { candidate: Some(c) }) if c == "Jordan Reyes"));
}

#[test]
fn broadcast_is_announced_spoken_in_chunks_and_finished() {
    let mind = Mind::new(&[r#"[{"type": "broadcast", "targetPlace": "Town Square"}]"#]);
    let mut engine = town(square(), Canned::new("Hello town. Bake sale tomorrow!"), &mind);
    let mut rx = engine.subscribe();
    engine.spawn_agent_at("Bob", "The town's baker.", at(&engine, 3, 3)).unwrap();
    let inside = PlayerId::new("harry");
    let outside = PlayerId::new("hermione");
    engine.join_at(inside.clone(), "harry", Position::new(96.0, 96.0)).unwrap();
    engine.join_at(outside.clone(), "hermione", at(&engine, 14, 14)).unwrap();
    drain(&mut rx);

    let mut heard = Vec::new();
    let mut headlines = Vec::new();
    for _ in 0..400 {
        engine.tick(FRAME);
        for delivery in drain(&mut rx) {
            match delivery.event {
                Inbound::ListenBroadcast(m) => heard.push((delivery.to, m.message)),
                Inbound::News(items) if delivery.to == inside => {
                    headlines.extend(items.into_iter().map(|n| n.kind))
                }
                _ => {}
            }
        }
    }

    assert_eq!(
        heard,
        vec![
            (inside.clone(), "Hello town.".to_string()),
            (inside.clone(), "Bake sale tomorrow!".to_string()),
        ]
    );
    let speaker = "Bob".to_string();
    assert_eq!(
        headlines,
        vec![
            NewsKind::BroadcastAnnounced { speaker: speaker.clone() },
            NewsKind::BroadcastFinished { speaker },
        ]
    );
    assert!(matches!(
        mind.digests().first(),
        Some(ActionDigest::Broadcast { content, interrupted: false }) if content == "Hello town. Bake sale tomorrow!"
    ));
}
