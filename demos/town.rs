use social_town::llm::OpenAiClient;
use social_town::map::Place;
use social_town::{Command, Config, Delivery, Engine, Inbound, PlayerId, WorldMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Two agents in a small town, talking to an OpenAI-compatible endpoint.
///
/// Set OPENAI_API_KEY (or point `llm.base_url` at a local server) and run
/// `cargo run --example town`. Pass a config JSON path as the first argument
/// to override the defaults.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match std::env::args().nth(1) {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    let map = WorldMap::new(
        40,
        30,
        16.0,
        vec![
            Place::new("Spawn", 16.0, 16.0, 96.0, 64.0),
            Place::new("Town Square", 224.0, 160.0, 160.0, 128.0),
            Place::new("Town Square (podium)", 288.0, 160.0, 32.0, 32.0),
            Place::new("Library", 480.0, 48.0, 96.0, 80.0),
            Place::new("Town Hall", 448.0, 320.0, 128.0, 96.0),
        ],
        "Spawn",
    );

    let llm = Arc::new(OpenAiClient::new(&config.llm));
    let mut engine = Engine::new(config, map, llm);
    engine.spawn_agent("Ann", "A retired librarian who runs the town's book club.")?;
    engine.spawn_agent(
        "Bob",
        "The town's baker. Wants to be elected to the council and loves giving speeches.",
    )?;

    let mut deliveries = engine.subscribe();
    let (commands, rx) = mpsc::channel(64);
    let engine_task = tokio::spawn(engine.run(rx));

    // Stand in for a human client that just prints what it would be shown
    tokio::spawn(async move {
        while let Some(Delivery { to, event }) = deliveries.recv().await {
            match event {
                Inbound::NewMessage(message) => println!("[{}] {}: {}", to, message.from, message.message),
                Inbound::ListenBroadcast(message) => {
                    println!("[{}] 📢 {} at {}: {}", to, message.from, message.place, message.message)
                }
                Inbound::News(items) => {
                    for item in items {
                        println!("[{}] 📰 {}", to, item.message);
                    }
                }
                _ => {}
            }
        }
    });

    commands
        .send(Command::Join {
            id: PlayerId::new("observer"),
            username: "observer".to_string(),
        })
        .await?;

    tokio::time::sleep(Duration::from_secs(120)).await;
    commands.send(Command::FinishVoting).await?;
    commands.send(Command::Shutdown).await?;
    engine_task.await??;
    Ok(())
}
