//! The durable audit log: single writer task, concurrent readers.

use crate::entry::AuditEntry;
use crate::signer::EntrySigner;
use crate::AuditError;
use alder_types::Event;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot, RwLock};

/// Outcome of a chain verification pass.
#[derive(Clone, Debug, PartialEq)]
pub enum ChainVerification {
    /// Every checked entry links correctly to its predecessor.
    Ok { checked: u64 },
    /// The first break found, with the failing sequence.
    BrokenAt { sequence: u64, detail: String },
}

enum Command {
    Append {
        event: Event,
        reply: oneshot::Sender<Result<u64, AuditError>>,
    },
}

/// Handle to the audit log. Cheap to clone; all clones share the single
/// writer task and the poisoned flag.
#[derive(Clone)]
pub struct AuditLog {
    path: PathBuf,
    tx: mpsc::Sender<Command>,
    index: Arc<RwLock<Vec<u64>>>,
    poisoned: Arc<AtomicBool>,
}

impl AuditLog {
    /// Open (or create) the log at `path`, verifying the whole existing
    /// chain. A broken chain fails the open; a partial trailing frame from
    /// an interrupted append is truncated away.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, AuditError> {
        Self::open_with_signer(path, None).await
    }

    pub async fn open_with_signer(
        path: impl AsRef<Path>,
        signer: Option<Arc<dyn EntrySigner>>,
    ) -> Result<Self, AuditError> {
        let path = path.as_ref().to_path_buf();
        let (offsets, last, end_offset) = scan_and_verify(&path).await?;

        // Rebuild the advisory side index from the verified stream.
        let index_path = index_path_for(&path);
        let mut index_file = File::create(&index_path).await?;
        for offset in &offsets {
            index_file.write_all(&offset.to_le_bytes()).await?;
        }
        index_file.flush().await?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        let index = Arc::new(RwLock::new(offsets));
        let poisoned = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::channel(256);

        let writer = Writer {
            file,
            index_file,
            index: Arc::clone(&index),
            poisoned: Arc::clone(&poisoned),
            signer,
            last,
            offset: end_offset,
        };
        tokio::spawn(writer.run(rx));

        Ok(Self {
            path,
            tx,
            index,
            poisoned,
        })
    }

    /// Append an event. Returns its sequence number once the entry is
    /// durable on disk.
    pub async fn append(&self, event: Event) -> Result<u64, AuditError> {
        if self.poisoned.load(Ordering::SeqCst) {
            return Err(AuditError::Poisoned);
        }
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Append { event, reply })
            .await
            .map_err(|_| AuditError::Closed)?;
        rx.await.map_err(|_| AuditError::Closed)?
    }

    /// Number of entries in the log.
    pub async fn len(&self) -> u64 {
        self.index.read().await.len() as u64
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Read entries with sequence in `[start, end)`, clamped to the log.
    pub async fn read_range(&self, start: u64, end: u64) -> Result<Vec<AuditEntry>, AuditError> {
        let offset = {
            let index = self.index.read().await;
            let len = index.len() as u64;
            let end = end.min(len);
            if start >= end {
                return Ok(Vec::new());
            }
            (index[start as usize], end)
        };
        let (start_offset, end) = offset;

        let mut file = File::open(&self.path).await?;
        file.seek(SeekFrom::Start(start_offset)).await?;
        let mut entries = Vec::with_capacity((end - start) as usize);
        for _ in start..end {
            entries.push(read_frame(&mut file).await?);
        }
        Ok(entries)
    }

    /// The most recent `limit` entries, in sequence order.
    pub async fn read_recent(&self, limit: u64) -> Result<Vec<AuditEntry>, AuditError> {
        let len = self.len().await;
        self.read_range(len.saturating_sub(limit), len).await
    }

    /// Recompute hashes over `[start, end)` and check every link. A break
    /// poisons the log so further appends fail.
    pub async fn verify_chain(
        &self,
        start: u64,
        end: u64,
    ) -> Result<ChainVerification, AuditError> {
        // Read one extra entry before `start` so the first link is checked.
        let read_from = start.saturating_sub(1);
        let entries = self.read_range(read_from, end).await?;
        if entries.is_empty() {
            return Ok(ChainVerification::Ok { checked: 0 });
        }

        let mut previous: Option<&AuditEntry> = None;
        let mut checked = 0u64;
        for entry in &entries {
            let result = if entry.sequence == 0 {
                entry.verify_linkage(None)
            } else if let Some(prev) = previous {
                entry.verify_linkage(Some(prev))
            } else {
                // A mid-stream starting point: only the self hash can be
                // recomputed without the predecessor.
                entry.verify_self()
            };
            if let Err(AuditError::ChainBroken { sequence, detail }) = result {
                self.poisoned.store(true, Ordering::SeqCst);
                // The stream itself can no longer carry this diagnostic;
                // it goes out of band through the log pipeline.
                tracing::error!(
                    sequence,
                    %detail,
                    event_type = alder_types::event_types::CHAIN_BROKEN,
                    "audit chain break detected; appends refused until operator intervention"
                );
                return Ok(ChainVerification::BrokenAt { sequence, detail });
            }
            result?;
            if entry.sequence >= start {
                checked += 1;
            }
            previous = Some(entry);
        }
        Ok(ChainVerification::Ok { checked })
    }

    /// Whether a chain break has been detected on this log.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned.load(Ordering::SeqCst)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

struct Writer {
    file: File,
    index_file: File,
    index: Arc<RwLock<Vec<u64>>>,
    poisoned: Arc<AtomicBool>,
    signer: Option<Arc<dyn EntrySigner>>,
    /// Sequence and self hash of the last entry, if any.
    last: Option<(u64, String)>,
    offset: u64,
}

impl Writer {
    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        while let Some(command) = rx.recv().await {
            match command {
                Command::Append { event, reply } => {
                    let result = self.append(event).await;
                    let _ = reply.send(result);
                }
            }
        }
    }

    async fn append(&mut self, event: Event) -> Result<u64, AuditError> {
        if self.poisoned.load(Ordering::SeqCst) {
            return Err(AuditError::Poisoned);
        }

        let previous = self.last.as_ref().map(|(sequence, hash)| {
            // Only the linkage fields of the predecessor matter here.
            (*sequence, hash.clone())
        });
        let mut entry = match &previous {
            Some((sequence, hash)) => {
                let mut e = AuditEntry {
                    sequence: sequence + 1,
                    previous_hash: hash.clone(),
                    self_hash: String::new(),
                    signature: None,
                    event,
                };
                e.self_hash = crate::entry::compute_self_hash(&e.previous_hash, &e.event)?;
                e
            }
            None => AuditEntry::next(None, event)?,
        };
        if let Some(signer) = &self.signer {
            entry.signature = Some(signer.sign_hash(&entry.self_hash));
        }

        let body = serde_json::to_vec(&entry)?;
        let frame_offset = self.offset;
        self.file
            .write_all(&(body.len() as u32).to_le_bytes())
            .await?;
        self.file.write_all(&body).await?;
        // Durability before visibility: the caller must not observe a
        // sequence number for an entry that could vanish in a crash.
        self.file.sync_data().await?;

        self.index_file
            .write_all(&frame_offset.to_le_bytes())
            .await?;

        self.offset += 4 + body.len() as u64;
        self.last = Some((entry.sequence, entry.self_hash.clone()));
        self.index.write().await.push(frame_offset);

        Ok(entry.sequence)
    }
}

fn index_path_for(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(".idx");
    PathBuf::from(os)
}

async fn read_frame(file: &mut File) -> Result<AuditEntry, AuditError> {
    let mut len_buf = [0u8; 4];
    file.read_exact(&mut len_buf).await?;
    let frame_len = u32::from_le_bytes(len_buf) as usize;
    let mut body = vec![0u8; frame_len];
    file.read_exact(&mut body).await?;
    Ok(serde_json::from_slice(&body)?)
}

/// Scan the whole stream, verifying every link. Returns the frame offsets,
/// the last entry's (sequence, self_hash), and the end offset. A partial
/// trailing frame is truncated; a verification failure aborts the open.
async fn scan_and_verify(
    path: &Path,
) -> Result<(Vec<u64>, Option<(u64, String)>, u64), AuditError> {
    let mut offsets = Vec::new();
    let mut last: Option<AuditEntry> = None;
    let mut offset = 0u64;

    let Ok(mut file) = File::open(path).await else {
        return Ok((offsets, None, 0));
    };
    let file_len = file.metadata().await?.len();

    while offset < file_len {
        let mut len_buf = [0u8; 4];
        if file.read_exact(&mut len_buf).await.is_err() {
            break; // partial length prefix
        }
        let frame_len = u32::from_le_bytes(len_buf) as u64;
        if offset + 4 + frame_len > file_len {
            break; // partial body
        }
        let mut body = vec![0u8; frame_len as usize];
        file.read_exact(&mut body).await?;
        let entry: AuditEntry = serde_json::from_slice(&body)?;
        entry.verify_linkage(last.as_ref())?;

        offsets.push(offset);
        offset += 4 + frame_len;
        last = Some(entry);
    }

    if offset < file_len {
        tracing::warn!(
            path = %path.display(),
            kept = offset,
            total = file_len,
            "truncating partial trailing audit frame"
        );
        drop(file);
        let file = OpenOptions::new().write(true).open(path).await?;
        file.set_len(offset).await?;
        file.sync_data().await?;
    }

    Ok((
        offsets,
        last.map(|e| (e.sequence, e.self_hash)),
        offset,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alder_types::ComponentId;

    fn event(n: u32) -> Event {
        Event::new("test.tick", ComponentId::new("tests"))
            .with_payload(serde_json::json!({ "n": n }))
    }

    #[tokio::test]
    async fn appends_are_sequential_and_readable() {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLog::open(dir.path().join("audit.log")).await.unwrap();

        for n in 0..5u32 {
            let seq = log.append(event(n)).await.unwrap();
            assert_eq!(seq, n as u64);
        }

        let entries = log.read_range(1, 4).await.unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].sequence, 1);
        assert_eq!(entries[2].sequence, 3);

        let recent = log.read_recent(2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[1].sequence, 4);
    }

    #[tokio::test]
    async fn chain_verifies_after_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.log");

        {
            let log = AuditLog::open(&path).await.unwrap();
            for n in 0..4u32 {
                log.append(event(n)).await.unwrap();
            }
        }

        let log = AuditLog::open(&path).await.unwrap();
        // Sequences continue across restarts.
        let seq = log.append(event(4)).await.unwrap();
        assert_eq!(seq, 4);

        match log.verify_chain(0, 5).await.unwrap() {
            ChainVerification::Ok { checked } => assert_eq!(checked, 5),
            other => panic!("expected ok, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn tampering_breaks_the_chain_and_poisons_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.log");
        let log = AuditLog::open(&path).await.unwrap();
        for n in 0..3u32 {
            log.append(event(n)).await.unwrap();
        }

        // Flip payload bytes of a middle frame behind the log's back.
        let mut bytes = std::fs::read(&path).unwrap();
        let needle = b"\"n\":1";
        let pos = bytes
            .windows(needle.len())
            .position(|w| w == needle)
            .unwrap();
        bytes[pos + 4] = b'7';
        std::fs::write(&path, &bytes).unwrap();

        match log.verify_chain(0, 3).await.unwrap() {
            ChainVerification::BrokenAt { sequence, .. } => assert_eq!(sequence, 1),
            other => panic!("expected break, got {:?}", other),
        }
        assert!(log.is_poisoned());
        assert!(matches!(
            log.append(event(9)).await,
            Err(AuditError::Poisoned)
        ));

        // A fresh open refuses the broken stream outright.
        assert!(matches!(
            AuditLog::open(&path).await,
            Err(AuditError::ChainBroken { .. })
        ));
    }

    #[tokio::test]
    async fn partial_trailing_frame_is_truncated_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.log");
        {
            let log = AuditLog::open(&path).await.unwrap();
            log.append(event(0)).await.unwrap();
            log.append(event(1)).await.unwrap();
        }

        // Simulate a crash mid-append: garbage length prefix and body.
        {
            use std::io::Write;
            let mut f = std::fs::OpenOptions::new()
                .append(true)
                .open(&path)
                .unwrap();
            f.write_all(&[200, 0, 0, 0, b'{', b'x']).unwrap();
        }

        let log = AuditLog::open(&path).await.unwrap();
        assert_eq!(log.len().await, 2);
        let seq = log.append(event(2)).await.unwrap();
        assert_eq!(seq, 2);
        match log.verify_chain(0, 3).await.unwrap() {
            ChainVerification::Ok { checked } => assert_eq!(checked, 3),
            other => panic!("expected ok, got {:?}", other),
        }
    }

    proptest::proptest! {
        // Whatever events are appended, in however many sessions, the
        // chain verifies end to end afterwards.
        #[test]
        fn chain_verifies_for_arbitrary_event_batches(
            batches in proptest::collection::vec(
                proptest::collection::vec("[a-z]{1,12}", 1..6),
                1..4,
            )
        ) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("runtime");
            rt.block_on(async move {
                let dir = tempfile::tempdir().unwrap();
                let path = dir.path().join("audit.log");
                let mut total = 0u64;
                for batch in &batches {
                    let log = AuditLog::open(&path).await.unwrap();
                    for payload in batch {
                        let event = Event::new("prop.tick", ComponentId::new("tests"))
                            .with_payload(serde_json::json!({ "p": payload }));
                        let seq = log.append(event).await.unwrap();
                        assert_eq!(seq, total);
                        total += 1;
                    }
                }
                let log = AuditLog::open(&path).await.unwrap();
                match log.verify_chain(0, total).await.unwrap() {
                    ChainVerification::Ok { checked } => assert_eq!(checked, total),
                    other => panic!("expected intact chain, got {:?}", other),
                }
            });
        }
    }

    #[tokio::test]
    async fn mid_range_verification_checks_incoming_link() {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLog::open(dir.path().join("audit.log")).await.unwrap();
        for n in 0..6u32 {
            log.append(event(n)).await.unwrap();
        }
        match log.verify_chain(3, 6).await.unwrap() {
            ChainVerification::Ok { checked } => assert_eq!(checked, 3),
            other => panic!("expected ok, got {:?}", other),
        }
    }
}
