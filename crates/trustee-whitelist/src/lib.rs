//! Trustee Whitelist - the data trustees this connector trusts
//!
//! The whitelist is an ordered list of participants. Order matters: the
//! participant-list hash is computed in list order, and a negotiation picks
//! the first of our trustees that the counterparty also trusts.
//!
//! The list can be seeded from a JSON file and, when persistence is enabled,
//! is written back to that file after every change.

use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use trustee_types::{compute_hash, Participant, Result, TrusteeError};

/// Thread-safe registry of trusted participants
#[derive(Debug, Default)]
pub struct TrustedParticipantsWhitelist {
    participants: RwLock<Vec<Participant>>,
    /// File rewritten after each change, if persistence is enabled
    persist_path: Option<PathBuf>,
}

impl TrustedParticipantsWhitelist {
    /// Create an empty in-memory whitelist
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a whitelist holding the given participants, dropping duplicates
    pub fn with_participants(participants: impl IntoIterator<Item = Participant>) -> Self {
        let mut list: Vec<Participant> = Vec::new();
        for participant in participants {
            if !list.contains(&participant) {
                list.push(participant);
            }
        }
        Self {
            participants: RwLock::new(list),
            persist_path: None,
        }
    }

    /// Seed the whitelist from a JSON array of participants
    ///
    /// A missing file yields an empty whitelist. With `persist` set, every
    /// later change is written back to `path`.
    pub fn load_from_file(path: impl AsRef<Path>, persist: bool) -> Result<Self> {
        let path = path.as_ref();
        let participants: Vec<Participant> = match std::fs::read(path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                TrusteeError::InvalidInput(format!(
                    "malformed whitelist file {}: {e}",
                    path.display()
                ))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "No whitelist file found, starting empty");
                Vec::new()
            }
            Err(e) => return Err(e.into()),
        };

        let mut whitelist = Self::with_participants(participants);
        tracing::info!(
            path = %path.display(),
            count = whitelist.len(),
            "Loaded trusted participants"
        );
        if persist {
            whitelist.persist_path = Some(path.to_path_buf());
        }
        Ok(whitelist)
    }

    /// Add a participant; returns `false` if an equal participant is already listed
    pub fn add(&self, participant: Participant) -> bool {
        let mut participants = self.participants.write();
        if participants.iter().any(|p| *p == participant) {
            return false;
        }
        participants.push(participant);
        self.persist(&participants);
        true
    }

    /// Remove a participant; returns `false` if it was not listed
    pub fn remove(&self, participant: &Participant) -> bool {
        let mut participants = self.participants.write();
        let before = participants.len();
        participants.retain(|p| p != participant);
        let removed = participants.len() != before;
        if removed {
            self.persist(&participants);
        }
        removed
    }

    /// Snapshot of the whitelist in insertion order
    pub fn list(&self) -> Vec<Participant> {
        self.participants.read().clone()
    }

    pub fn contains(&self, participant: &Participant) -> bool {
        self.participants.read().iter().any(|p| p == participant)
    }

    /// Whether some trusted participant matches every supplied key
    ///
    /// An `id` match counts on its own; otherwise `name` and `url` must both
    /// match when given.
    pub fn is_trusted(&self, candidate: &Participant) -> bool {
        self.participants.read().iter().any(|p| {
            let id_match = matches!((&p.id, &candidate.id), (Some(a), Some(b)) if a == b);
            let name_match = p.name == candidate.name;
            let url_match = !candidate.has_url() || p.url == candidate.url;
            id_match || (name_match && url_match)
        })
    }

    pub fn len(&self) -> usize {
        self.participants.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.read().is_empty()
    }

    /// Hash of the current snapshot
    pub fn hash(&self) -> String {
        compute_hash(&self.participants.read())
    }

    /// Write the list back to disk; callers hold the write lock so writes never interleave
    fn persist(&self, participants: &[Participant]) {
        let Some(path) = &self.persist_path else {
            return;
        };
        if let Err(e) = write_atomically(path, participants) {
            tracing::warn!(path = %path.display(), error = %e, "Failed to persist whitelist");
        }
    }
}

fn write_atomically(path: &Path, participants: &[Participant]) -> Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut tmp, participants)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| TrusteeError::from(e.error))?;
    Ok(())
}
