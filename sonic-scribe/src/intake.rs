//! File intake: uploaded file handles and producer classification
//!
//! Classification only looks at the file name. With the default
//! [`ExtensionRule::FirstToken`] the name is split on `.` and the component
//! at index 1 is compared, case-sensitively, against `mid` and `midi`.
//! Everything else goes to audio transcription.

use sonic_common::config::ExtensionRule;
use sonic_common::events::ProducerKind;
use std::path::PathBuf;
use uuid::Uuid;

/// Extensions routed to MIDI decoding
const MIDI_EXTENSIONS: [&str; 2] = ["mid", "midi"];

/// Where an uploaded file's bytes live
#[derive(Debug, Clone)]
pub enum FileSource {
    /// Body of an HTTP upload
    Memory(Vec<u8>),
    /// File on local disk (CLI)
    Path(PathBuf),
}

/// A user-selected file
///
/// Immutable; selecting another file creates a new `UploadedFile` with a new id.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    id: Uuid,
    name: String,
    source: FileSource,
}

impl UploadedFile {
    /// File received as an in-memory upload
    pub fn from_bytes(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            source: FileSource::Memory(bytes),
        }
    }

    /// File on disk; the display name is the final path component
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        Self {
            id: Uuid::new_v4(),
            name,
            source: FileSource::Path(path),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &FileSource {
        &self.source
    }

    /// Read the complete file content
    pub async fn read_all(&self) -> std::io::Result<Vec<u8>> {
        match &self.source {
            FileSource::Memory(bytes) => Ok(bytes.clone()),
            FileSource::Path(path) => tokio::fs::read(path).await,
        }
    }
}

/// Choose a producer using the default first-token rule
pub fn classify(file_name: &str) -> ProducerKind {
    classify_with(file_name, ExtensionRule::FirstToken)
}

/// Choose a producer for `file_name` under `rule`
pub fn classify_with(file_name: &str, rule: ExtensionRule) -> ProducerKind {
    let token = match rule {
        ExtensionRule::FirstToken => file_name.split('.').nth(1),
        ExtensionRule::Trailing => file_name.rsplit_once('.').map(|(_, ext)| ext),
    };

    match token {
        Some(ext) if MIDI_EXTENSIONS.contains(&ext) => ProducerKind::MidiDecode,
        _ => ProducerKind::AudioTranscribe,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_midi_extensions_select_midi_decode() {
        assert_eq!(classify("song.mid"), ProducerKind::MidiDecode);
        assert_eq!(classify("take1.midi"), ProducerKind::MidiDecode);
    }

    #[test]
    fn test_audio_and_unknown_extensions_select_transcription() {
        assert_eq!(classify("song.wav"), ProducerKind::AudioTranscribe);
        assert_eq!(classify("song.mp3"), ProducerKind::AudioTranscribe);
        assert_eq!(classify("noext"), ProducerKind::AudioTranscribe);
        assert_eq!(classify(""), ProducerKind::AudioTranscribe);
    }

    #[test]
    fn test_match_is_case_sensitive() {
        assert_eq!(classify("song.MIDI"), ProducerKind::AudioTranscribe);
        assert_eq!(classify("song.Mid"), ProducerKind::AudioTranscribe);
    }

    #[test]
    fn test_first_token_rule_uses_index_one() {
        assert_eq!(classify("my.song.wav"), ProducerKind::AudioTranscribe);
        assert_eq!(classify("archive.mid.bak"), ProducerKind::MidiDecode);
        assert_eq!(classify("take.wav.mid"), ProducerKind::AudioTranscribe);
        assert_eq!(classify(".mid"), ProducerKind::MidiDecode);
    }

    #[test]
    fn test_trailing_rule_uses_last_extension() {
        let rule = ExtensionRule::Trailing;
        assert_eq!(classify_with("archive.mid.bak", rule), ProducerKind::AudioTranscribe);
        assert_eq!(classify_with("take.wav.mid", rule), ProducerKind::MidiDecode);
        assert_eq!(classify_with("song.midi", rule), ProducerKind::MidiDecode);
        assert_eq!(classify_with("noext", rule), ProducerKind::AudioTranscribe);
    }

    #[test]
    fn test_from_path_uses_file_name() {
        let file = UploadedFile::from_path("/tmp/uploads/take1.wav");
        assert_eq!(file.name(), "take1.wav");
    }

    #[tokio::test]
    async fn test_read_all_from_memory_and_disk() {
        let memory = UploadedFile::from_bytes("a.mid", vec![1, 2, 3]);
        assert_eq!(memory.read_all().await.unwrap(), vec![1, 2, 3]);

        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("b.wav");
        std::fs::write(&path, [9u8, 8, 7]).unwrap();
        let disk = UploadedFile::from_path(&path);
        assert_eq!(disk.read_all().await.unwrap(), vec![9, 8, 7]);

        let missing = UploadedFile::from_path(dir.path().join("missing.wav"));
        assert!(missing.read_all().await.is_err());
    }

    #[test]
    fn test_each_upload_gets_a_new_id() {
        let a = UploadedFile::from_bytes("a.wav", Vec::new());
        let b = UploadedFile::from_bytes("a.wav", Vec::new());
        assert_ne!(a.id(), b.id());
    }
}
