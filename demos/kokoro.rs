use std::path::{Path, PathBuf};
use std::time::Instant;

use tts_wordsync::{
    engines::kokoro::{KokoroEngine, KokoroInferenceParams, KokoroModelParams},
    pipeline::synthesize_unit,
    probe::MediaProbe,
    SpeechEngine, TimingCalculator,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let model_dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("models/kokoro"));

    let mut engine = KokoroEngine::new(&model_dir)
        .with_model_params(KokoroModelParams::default())
        .with_params(KokoroInferenceParams {
            voice: "af_heart".to_string(),
            speed: 1.0,
            ..Default::default()
        });

    let load_start = Instant::now();
    engine.initialize()?;
    println!("Model loaded in {:.2?}", load_start.elapsed());
    println!("Available voices: {:?}", engine.list_voices());

    let text = "Hello! This is Kokoro, reading along word by word. \
                Every word below comes with its own start and end time.";

    let synth_start = Instant::now();
    let unit = synthesize_unit(
        &mut engine,
        &MediaProbe::new(),
        &TimingCalculator::default(),
        text,
        Path::new("output.wav"),
    )?;
    let synth_dur = synth_start.elapsed();

    println!(
        "Synthesized {:.2}s audio in {:.2?} ({:?} timing)",
        unit.total_duration(),
        synth_dur,
        unit.timeline.source
    );
    for (word, timing) in unit.text.words().zip(unit.timings()) {
        println!("  {:>6.2}s - {:>6.2}s  {word}", timing.start, timing.end);
    }

    let path = unit.clip.persist();
    println!("Saved to {}", path.display());
    Ok(())
}
