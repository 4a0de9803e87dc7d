//! Read a paragraph aloud: synthesizes each sentence with the first
//! available engine and prints word highlights as a simulated clock advances.
//!
//! ```text
//! RUST_LOG=info cargo run --example read_along -- [config.json] [text file]
//! ```

use std::path::PathBuf;
use std::time::{Duration, Instant};

use tts_wordsync::{
    pipeline::SynthesisPipeline, registry::EngineRegistry, text::split_sentences,
    PlaybackSynchronizer, ReaderConfig, SyncEvent,
};

const SAMPLE_TEXT: &str = "The quick brown fox jumps over the lazy dog. \
    It was a well-known fact, oft repeated, that foxes are quick! \
    Was the dog really lazy? Nobody could say.";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let config = match args.next() {
        Some(path) => ReaderConfig::load(&PathBuf::from(path))?,
        None => ReaderConfig::default(),
    };
    let text = match args.next() {
        Some(path) => std::fs::read_to_string(path)?,
        None => SAMPLE_TEXT.to_string(),
    };

    let mut registry = EngineRegistry::with_builtin(&config);
    registry.initialize_all();
    for (name, reason) in registry.unavailable() {
        println!("Engine '{name}' unavailable: {reason}");
    }
    println!("Available engines: {:?}", registry.available_names());

    let engine = registry
        .take_default()
        .ok_or("no speech engine is available")?;
    let mut pipeline = SynthesisPipeline::new(engine, &config)?;
    let overlap = pipeline.overlap_seconds();

    let sentences = split_sentences(&text);
    pipeline.start(sentences.clone(), 0);

    while let Some(outcome) = pipeline.next().await {
        let unit = match outcome.result {
            Ok(unit) => unit,
            Err(e) => {
                log::warn!("Skipping sentence {}: {e}", outcome.index);
                continue;
            }
        };

        println!(
            "\n[{}] {:.2}s, {:?} timing: {}",
            outcome.index,
            unit.total_duration(),
            unit.timeline.source,
            sentences[outcome.index]
        );
        let words: Vec<String> = unit.text.words().map(str::to_string).collect();

        // Simulated playback: advance the clock in 50ms steps.
        let mut sync = PlaybackSynchronizer::new(unit);
        let t0 = Instant::now();
        sync.start(t0);
        let mut last = None;
        let mut step = 0u64;
        loop {
            let now = t0 + Duration::from_millis(step * 50);
            match sync.tick(now) {
                Some(SyncEvent::Highlight {
                    word_index,
                    progress,
                }) if last != Some(word_index) => {
                    println!("  {:>5.1}%  {}", progress * 100.0, words[word_index]);
                    last = Some(word_index);
                }
                Some(SyncEvent::Finished) => break,
                _ => {}
            }
            step += 1;
        }
        println!("  next sentence would start at {:.2}s", sync.handoff_at(overlap));
    }

    Ok(())
}
