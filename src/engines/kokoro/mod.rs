//! Kokoro-82M text-to-speech engine.
//!
//! Uses the Kokoro-82M ONNX model with espeak-ng for phonemization and
//! supports 9 languages. Word timing comes from the model's predicted
//! per-token durations when the export provides them.
//!
//! # System Requirements
//!
//! **espeak-ng** must be installed on your system:
//! - **Linux**: `sudo apt-get install espeak-ng`
//! - **macOS**: `brew install espeak-ng`
//! - **Windows**: Download installer from <https://espeak-ng.org/download>
//!
//! # Model Directory Layout
//!
//! ```text
//! models/kokoro/
//! ├── kokoro-v1.0.onnx    # any .onnx export; one with a duration output enables timing
//! ├── voices-v1.0.bin     # voice data archive (.npz format)
//! └── config.json         # optional, vocabulary
//! ```
//!
//! # Language Support
//!
//! | Voice prefix | Language | espeak-ng code |
//! |---|---|---|
//! | `af_`, `am_` | American English | `en-us` |
//! | `bf_`, `bm_` | British English | `en-gb` |
//! | `ef_`, `em_` | Spanish | `es` |
//! | `ff_` | French | `fr` |
//! | `hf_`, `hm_` | Hindi | `hi` |
//! | `if_`, `im_` | Italian | `it` |
//! | `jf_`, `jm_` | Japanese | `ja` |
//! | `pf_`, `pm_` | Brazilian Portuguese | `pt-br` |
//! | `zf_`, `zm_` | Mandarin Chinese | `cmn` |

pub mod engine;
pub mod model;
pub mod phonemizer;
mod timing;
pub mod vocab;
pub mod voices;

pub use engine::{KokoroEngine, KokoroInferenceParams, KokoroModelParams};
pub use model::KokoroError;
