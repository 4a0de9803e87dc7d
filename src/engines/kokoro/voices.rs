//! Voice style vectors from the `voices-v1.0.bin` archive.
//!
//! The archive is a numpy `.npz` (zip of `.npy` files), one entry per voice.
//! Each entry is a little-endian float32 array of shape `[N, 1, 256]` or
//! `[N, 256]`; row `i` is the style used for a sequence of `i` phoneme tokens.

use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;

use super::model::{KokoroError, STYLE_DIM};

type Style = [f32; STYLE_DIM];

pub struct VoiceStore {
    voices: HashMap<String, Vec<Style>>,
}

impl VoiceStore {
    pub fn load(path: &Path) -> Result<Self, KokoroError> {
        let store = Self::from_reader(File::open(path)?)?;
        log::info!("Loaded {} voices from {}", store.voices.len(), path.display());
        Ok(store)
    }

    fn from_reader<R: Read + Seek>(reader: R) -> Result<Self, KokoroError> {
        let mut archive = zip::ZipArchive::new(reader)
            .map_err(|e| KokoroError::VoiceParse(format!("not a zip archive: {e}")))?;
        let mut voices = HashMap::new();

        for i in 0..archive.len() {
            let mut entry = archive
                .by_index(i)
                .map_err(|e| KokoroError::VoiceParse(format!("zip entry {i}: {e}")))?;
            if entry.is_dir() {
                continue;
            }
            let name = entry.name().to_string();
            let Some(voice) = name.strip_suffix(".npy").filter(|v| !v.is_empty()) else {
                log::debug!("Skipping non-voice entry {name}");
                continue;
            };

            let mut data = Vec::with_capacity(entry.size() as usize);
            entry
                .read_to_end(&mut data)
                .map_err(|e| KokoroError::VoiceParse(format!("{name}: {e}")))?;
            voices.insert(voice.to_string(), parse_npy(&data, &name)?);
        }

        Ok(Self { voices })
    }

    /// Style vector for `voice` at `idx`, clamped to the last available row.
    pub fn get_style(&self, voice: &str, idx: usize) -> Result<Style, KokoroError> {
        let styles = self
            .voices
            .get(voice)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| KokoroError::VoiceNotFound(voice.to_string()))?;
        Ok(styles[idx.min(styles.len() - 1)])
    }

    /// Voice names in sorted order.
    pub fn list_voices(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.voices.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

fn parse_npy(data: &[u8], name: &str) -> Result<Vec<Style>, KokoroError> {
    let bad = |reason: String| KokoroError::VoiceParse(format!("{name}: {reason}"));

    if data.len() < 10 || &data[..6] != b"\x93NUMPY" {
        return Err(bad("missing numpy magic".to_string()));
    }
    // Version 1.x uses a u16 header length, 2.x and later a u32.
    let (header_len, header_start) = match data[6] {
        1 => (u16::from_le_bytes([data[8], data[9]]) as usize, 10),
        _ if data.len() >= 12 => (
            u32::from_le_bytes([data[8], data[9], data[10], data[11]]) as usize,
            12,
        ),
        v => return Err(bad(format!("unsupported npy version {v}"))),
    };
    let body_start = header_start + header_len;
    if data.len() < body_start {
        return Err(bad(format!(
            "header truncated (need {body_start} bytes, got {})",
            data.len()
        )));
    }

    let header = String::from_utf8_lossy(&data[header_start..body_start]);
    if !header.contains("'<f4'") {
        return Err(bad(format!("expected little-endian float32, header {header:?}")));
    }
    if header.contains("'fortran_order': True") {
        return Err(bad("fortran-ordered arrays are not supported".to_string()));
    }

    let body = &data[body_start..];
    let row_bytes = STYLE_DIM * 4;
    if body.is_empty() || body.len() % row_bytes != 0 {
        return Err(bad(format!(
            "{} data bytes is not a whole number of {STYLE_DIM}-float rows",
            body.len()
        )));
    }

    Ok(body
        .chunks_exact(row_bytes)
        .map(|row| {
            let mut style = [0f32; STYLE_DIM];
            for (value, bytes) in style.iter_mut().zip(row.chunks_exact(4)) {
                *value = f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
            }
            style
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};

    fn npy(rows: usize, descr: &str) -> Vec<u8> {
        let mut header = format!(
            "{{'descr': '{descr}', 'fortran_order': False, 'shape': ({rows}, 1, {STYLE_DIM}), }}"
        );
        while (10 + header.len() + 1) % 64 != 0 {
            header.push(' ');
        }
        header.push('\n');

        let mut out = b"\x93NUMPY\x01\x00".to_vec();
        out.extend_from_slice(&(header.len() as u16).to_le_bytes());
        out.extend_from_slice(header.as_bytes());
        for row in 0..rows {
            for _ in 0..STYLE_DIM {
                out.extend_from_slice(&(row as f32).to_le_bytes());
            }
        }
        out
    }

    fn npz(entries: &[(&str, Vec<u8>)]) -> Cursor<Vec<u8>> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        for (name, data) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(data).unwrap();
        }
        let mut cursor = writer.finish().unwrap();
        cursor.set_position(0);
        cursor
    }

    #[test]
    fn loads_voices_and_clamps_style_index() {
        let store = VoiceStore::from_reader(npz(&[
            ("af_heart.npy", npy(3, "<f4")),
            ("bf_emma.npy", npy(1, "<f4")),
        ]))
        .unwrap();

        assert_eq!(store.list_voices(), vec!["af_heart", "bf_emma"]);
        assert_eq!(store.get_style("af_heart", 1).unwrap()[0], 1.0);
        assert_eq!(store.get_style("af_heart", 99).unwrap()[STYLE_DIM - 1], 2.0);
        assert!(matches!(
            store.get_style("zz_none", 0),
            Err(KokoroError::VoiceNotFound(_))
        ));
    }

    #[test]
    fn rejects_wrong_dtype() {
        let err = parse_npy(&npy(1, "<f8"), "x.npy").unwrap_err();
        assert!(matches!(err, KokoroError::VoiceParse(_)));
    }

    #[test]
    fn rejects_partial_rows() {
        let mut data = npy(1, "<f4");
        data.truncate(data.len() - 4);
        assert!(parse_npy(&data, "x.npy").is_err());
    }
}
