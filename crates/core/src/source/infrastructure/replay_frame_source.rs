use std::path::Path;
use std::time::{Duration, Instant};

use crate::shared::constants::IMAGE_EXTENSIONS;
use crate::source::domain::frame_source::{FrameSource, SourceError, SourceFrame};

/// Replays pre-encoded frames at a fixed emission rate.
///
/// Cycles through the payloads until `limit` frames have been emitted (or
/// forever without a limit). Emission times are scheduled from `open`, so a
/// consumer that falls behind sees a burst rather than a slowed-down
/// source, the way a live screencast behaves.
pub struct ReplayFrameSource {
    payloads: Vec<Vec<u8>>,
    interval: Duration,
    limit: Option<usize>,
    emitted: usize,
    next_due: Option<Instant>,
    awaiting_ack: Option<u64>,
}

impl ReplayFrameSource {
    pub fn new(payloads: Vec<Vec<u8>>, emission_rate: f64) -> Result<Self, SourceError> {
        if payloads.is_empty() {
            return Err("replay source needs at least one frame".into());
        }
        if !emission_rate.is_finite() || emission_rate <= 0.0 {
            return Err(format!("emission rate must be greater than 0, got {emission_rate}").into());
        }
        Ok(Self {
            payloads,
            interval: Duration::from_secs_f64(1.0 / emission_rate),
            limit: None,
            emitted: 0,
            next_due: None,
            awaiting_ack: None,
        })
    }

    /// Loads every image file in `dir`, sorted by file name.
    pub fn from_directory(dir: &Path, emission_rate: f64) -> Result<Self, SourceError> {
        let mut paths: Vec<_> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && has_image_extension(path))
            .collect();
        paths.sort();

        let payloads = paths
            .iter()
            .map(std::fs::read)
            .collect::<Result<Vec<_>, _>>()?;
        log::info!(
            "Loaded {} replay frames from {}",
            payloads.len(),
            dir.display()
        );
        Self::new(payloads, emission_rate)
    }

    /// Ends the source after `limit` frames.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn emitted(&self) -> usize {
        self.emitted
    }
}

impl FrameSource for ReplayFrameSource {
    fn open(&mut self) -> Result<(), SourceError> {
        self.next_due = Some(Instant::now() + self.interval);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<SourceFrame>, SourceError> {
        let due = self.next_due.ok_or("replay source is not open")?;
        if let Some(id) = self.awaiting_ack {
            return Err(format!("frame {id} has not been acknowledged").into());
        }
        if self.limit.is_some_and(|limit| self.emitted >= limit) {
            return Ok(None);
        }

        let now = Instant::now();
        if due > now {
            std::thread::sleep(due - now);
        }
        self.next_due = Some(due + self.interval);

        let ack_id = self.emitted as u64;
        let payload = self.payloads[self.emitted % self.payloads.len()].clone();
        self.emitted += 1;
        self.awaiting_ack = Some(ack_id);
        Ok(Some(SourceFrame { payload, ack_id }))
    }

    fn ack(&mut self, ack_id: u64) -> Result<(), SourceError> {
        match self.awaiting_ack {
            Some(id) if id == ack_id => {
                self.awaiting_ack = None;
                Ok(())
            }
            _ => Err(format!("unexpected ack {ack_id}").into()),
        }
    }

    fn close(&mut self) {
        self.next_due = None;
        self.awaiting_ack = None;
    }
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payloads(n: u8) -> Vec<Vec<u8>> {
        (0..n).map(|i| vec![i; 3]).collect()
    }

    #[test]
    fn test_rejects_empty_payloads() {
        assert!(ReplayFrameSource::new(Vec::new(), 30.0).is_err());
    }

    #[test]
    fn test_rejects_non_positive_rate() {
        assert!(ReplayFrameSource::new(payloads(1), 0.0).is_err());
        assert!(ReplayFrameSource::new(payloads(1), -5.0).is_err());
    }

    #[test]
    fn test_next_frame_before_open_fails() {
        let mut source = ReplayFrameSource::new(payloads(1), 100.0).unwrap();
        assert!(source.next_frame().is_err());
    }

    #[test]
    fn test_cycles_payloads_with_sequential_ack_ids() {
        let mut source = ReplayFrameSource::new(payloads(2), 1000.0)
            .unwrap()
            .with_limit(5);
        source.open().unwrap();

        let mut seen = Vec::new();
        while let Some(frame) = source.next_frame().unwrap() {
            seen.push((frame.ack_id, frame.payload[0]));
            source.ack(frame.ack_id).unwrap();
        }
        assert_eq!(seen, vec![(0, 0), (1, 1), (2, 0), (3, 1), (4, 0)]);
        assert_eq!(source.emitted(), 5);
    }

    #[test]
    fn test_refuses_next_frame_until_acked() {
        let mut source = ReplayFrameSource::new(payloads(1), 1000.0).unwrap();
        source.open().unwrap();
        let frame = source.next_frame().unwrap().unwrap();
        assert!(source.next_frame().is_err());
        source.ack(frame.ack_id).unwrap();
        assert!(source.next_frame().unwrap().is_some());
    }

    #[test]
    fn test_rejects_wrong_ack() {
        let mut source = ReplayFrameSource::new(payloads(1), 1000.0).unwrap();
        source.open().unwrap();
        source.next_frame().unwrap();
        assert!(source.ack(99).is_err());
    }

    #[test]
    fn test_emission_is_paced() {
        let mut source = ReplayFrameSource::new(payloads(1), 50.0)
            .unwrap()
            .with_limit(5);
        let start = Instant::now();
        source.open().unwrap();
        while let Some(frame) = source.next_frame().unwrap() {
            source.ack(frame.ack_id).unwrap();
        }
        // Five frames at 20 ms spacing, the first one interval after open.
        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[test]
    fn test_from_directory_loads_sorted_images_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("frame_002.png"), [2u8]).unwrap();
        std::fs::write(dir.path().join("frame_000.png"), [0u8]).unwrap();
        std::fs::write(dir.path().join("frame_001.jpeg"), [1u8]).unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"skip").unwrap();

        let mut source = ReplayFrameSource::from_directory(dir.path(), 1000.0)
            .unwrap()
            .with_limit(3);
        source.open().unwrap();
        let mut firsts = Vec::new();
        while let Some(frame) = source.next_frame().unwrap() {
            firsts.push(frame.payload[0]);
            source.ack(frame.ack_id).unwrap();
        }
        assert_eq!(firsts, vec![0, 1, 2]);
    }

    #[test]
    fn test_from_directory_without_images_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ReplayFrameSource::from_directory(dir.path(), 10.0).is_err());
    }
}
