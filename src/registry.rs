//! Startup registry of speech engines, keyed by name.

use std::collections::BTreeMap;

use crate::config::ReaderConfig;
use crate::engines::edge::EdgeEngine;
use crate::engines::espeak::EspeakEngine;
use crate::error::EngineError;
use crate::SpeechEngine;

/// Engines known to the reader.
///
/// After [`initialize_all`](Self::initialize_all), only engines whose
/// dependencies are present remain selectable; the rest are listed in
/// [`unavailable`](Self::unavailable) with the reason.
pub struct EngineRegistry {
    default_engine: String,
    engines: BTreeMap<String, Box<dyn SpeechEngine>>,
    unavailable: BTreeMap<String, String>,
}

impl EngineRegistry {
    pub fn new(default_engine: impl Into<String>) -> Self {
        Self {
            default_engine: default_engine.into(),
            engines: BTreeMap::new(),
            unavailable: BTreeMap::new(),
        }
    }

    /// Registry with every engine compiled into this build, configured from
    /// `config`. Nothing is initialized yet.
    pub fn with_builtin(config: &ReaderConfig) -> Self {
        let mut registry = Self::new(config.default_engine.clone());

        let voice = |name: &str, fallback: &str| {
            config.voice_for(name).unwrap_or(fallback).to_string()
        };
        registry.register(Box::new(EdgeEngine::new(voice(EdgeEngine::NAME, "en-US-JennyNeural"))));
        registry.register(Box::new(EspeakEngine::new(voice(EspeakEngine::NAME, "en-us"))));

        #[cfg(feature = "kokoro")]
        {
            use crate::engines::kokoro::{KokoroEngine, KokoroInferenceParams};
            let params = KokoroInferenceParams {
                voice: voice(KokoroEngine::NAME, "af_heart"),
                ..Default::default()
            };
            registry.register(Box::new(
                KokoroEngine::new(&config.kokoro_model_dir).with_params(params),
            ));
        }

        registry
    }

    /// Add or replace an engine under its own name.
    pub fn register(&mut self, engine: Box<dyn SpeechEngine>) {
        let name = engine.name().to_string();
        self.unavailable.remove(&name);
        if self.engines.insert(name.clone(), engine).is_some() {
            log::debug!("Replaced engine '{name}'");
        }
    }

    /// Initialize and warm up every registered engine.
    ///
    /// Engines that fail to initialize are dropped from the selectable set.
    /// Warm-up failures are logged and otherwise ignored.
    pub fn initialize_all(&mut self) {
        let names: Vec<String> = self.engines.keys().cloned().collect();

        for name in names {
            let Some(engine) = self.engines.get_mut(&name) else {
                continue;
            };
            match engine.initialize() {
                Ok(()) => {
                    if let Err(e) = engine.warm_up() {
                        log::warn!("Warm-up failed for engine '{name}': {e}");
                    }
                    log::info!("Engine '{name}' available");
                }
                Err(e) => {
                    match &e {
                        EngineError::DependencyMissing { .. } => log::warn!("{e}"),
                        _ => log::error!("Engine '{name}' failed to initialize: {e}"),
                    }
                    self.engines.remove(&name);
                    self.unavailable.insert(name, e.to_string());
                }
            }
        }
    }

    /// Selectable engine names, the configured default first.
    pub fn available_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.engines.keys().map(String::as_str).collect();
        if let Some(pos) = names.iter().position(|n| *n == self.default_engine) {
            let default = names.remove(pos);
            names.insert(0, default);
        }
        names
    }

    /// Engines that could not be initialized, with the reason.
    pub fn unavailable(&self) -> impl Iterator<Item = (&str, &str)> {
        self.unavailable
            .iter()
            .map(|(name, reason)| (name.as_str(), reason.as_str()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.engines.contains_key(name)
    }

    /// Remove an engine to hand it to a pipeline.
    pub fn take(&mut self, name: &str) -> Option<Box<dyn SpeechEngine>> {
        self.engines.remove(name)
    }

    /// Take the default engine, or the first available one when the default
    /// is missing.
    pub fn take_default(&mut self) -> Option<Box<dyn SpeechEngine>> {
        let name = self.available_names().first()?.to_string();
        if name != self.default_engine {
            log::warn!(
                "Default engine '{}' unavailable, using '{name}'",
                self.default_engine
            );
        }
        self.take(&name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{AudioClip, AudioFormat};
    use crate::EngineOutput;
    use std::path::Path;

    struct StubEngine {
        name: &'static str,
        missing: bool,
        warm_up_fails: bool,
    }

    impl StubEngine {
        fn boxed(name: &'static str, missing: bool) -> Box<dyn SpeechEngine> {
            Box::new(Self {
                name,
                missing,
                warm_up_fails: false,
            })
        }
    }

    impl SpeechEngine for StubEngine {
        fn name(&self) -> &str {
            self.name
        }

        fn output_format(&self) -> AudioFormat {
            AudioFormat::Wav
        }

        fn initialize(&mut self) -> Result<(), EngineError> {
            if self.missing {
                return Err(EngineError::missing(self.name, "binary not found"));
            }
            Ok(())
        }

        fn synthesize(&mut self, _text: &str, output_path: &Path) -> Result<EngineOutput, EngineError> {
            Ok(EngineOutput::untimed(AudioClip::borrowed(output_path, AudioFormat::Wav)))
        }

        fn warm_up(&mut self) -> Result<(), EngineError> {
            if self.warm_up_fails {
                return Err(EngineError::SynthesisFailure("cold".to_string()));
            }
            Ok(())
        }
    }

    #[test]
    fn missing_dependencies_are_excluded() {
        let mut registry = EngineRegistry::new("edge");
        registry.register(StubEngine::boxed("edge", true));
        registry.register(StubEngine::boxed("espeak", false));
        registry.register(StubEngine::boxed("kokoro", false));
        registry.initialize_all();

        assert_eq!(registry.available_names(), vec!["espeak", "kokoro"]);
        let unavailable: Vec<_> = registry.unavailable().collect();
        assert_eq!(unavailable.len(), 1);
        assert_eq!(unavailable[0].0, "edge");
        assert!(!registry.contains("edge"));
    }

    #[test]
    fn default_engine_is_listed_first() {
        let mut registry = EngineRegistry::new("kokoro");
        registry.register(StubEngine::boxed("edge", false));
        registry.register(StubEngine::boxed("espeak", false));
        registry.register(StubEngine::boxed("kokoro", false));
        registry.initialize_all();

        assert_eq!(registry.available_names(), vec!["kokoro", "edge", "espeak"]);
        let engine = registry.take_default().unwrap();
        assert_eq!(engine.name(), "kokoro");
        assert_eq!(registry.available_names(), vec!["edge", "espeak"]);
    }

    #[test]
    fn falls_back_when_default_is_unavailable() {
        let mut registry = EngineRegistry::new("edge");
        registry.register(StubEngine::boxed("edge", true));
        registry.register(StubEngine::boxed("espeak", false));
        registry.initialize_all();

        assert_eq!(registry.take_default().unwrap().name(), "espeak");
        assert!(registry.take_default().is_none());
    }

    #[test]
    fn warm_up_failure_keeps_engine() {
        let mut registry = EngineRegistry::new("espeak");
        registry.register(Box::new(StubEngine {
            name: "espeak",
            missing: false,
            warm_up_fails: true,
        }));
        registry.initialize_all();
        assert_eq!(registry.available_names(), vec!["espeak"]);
    }

    #[test]
    fn builtin_registry_reads_voices_from_config() {
        let registry = EngineRegistry::with_builtin(&ReaderConfig::default());
        assert!(registry.contains("edge"));
        assert!(registry.contains("espeak"));
        assert_eq!(registry.available_names()[0], "edge");
    }
}
