//! Fuzz target: durable checkpoint load
//!
//! Feeds arbitrary flash contents to `CheckpointStore::load_from_durable`
//! and verifies:
//! - No panics for any stored length or content
//! - The engine only ever receives a blob of exactly `STATE_BLOB_LEN`
//!   bytes, identical to what was stored
//! - Anything else is reported as `SizeMismatch`, never imported
//!
//! cargo fuzz run fuzz_durable_checkpoint

#![no_main]

use libfuzzer_sys::fuzz_target;

use airnode::app::ports::{ClockPort, FusionEngine, StorageError, StoragePort};
use airnode::checkpoint::{CheckpointStore, Transfer};
use airnode::error::CheckpointError;
use airnode::fusion::{BusHandle, BusInterface, FusedOutput, OutputId, RawSample, SampleRate, StateBlob, STATE_BLOB_LEN};

struct Synced;

impl ClockPort for Synced {
    fn now_ns(&self) -> i64 {
        0
    }

    fn calendar_year(&self) -> i32 {
        2025
    }
}

/// One stored value, whatever the namespace or key.
struct Flash(Vec<u8>);

impl StoragePort for Flash {
    fn read(&self, _ns: &str, _key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        if self.0.len() > buf.len() {
            return Err(StorageError::SizeMismatch);
        }
        buf[..self.0.len()].copy_from_slice(&self.0);
        Ok(self.0.len())
    }

    fn write(&mut self, _ns: &str, _key: &str, data: &[u8]) -> Result<(), StorageError> {
        self.0 = data.to_vec();
        Ok(())
    }
}

#[derive(Default)]
struct Sink {
    imported: Option<StateBlob>,
}

impl FusionEngine for Sink {
    fn init(&mut self, _bus: BusHandle, _iface: BusInterface) -> bool {
        true
    }
    fn set_config(&mut self, _config: &[u8]) -> bool {
        true
    }
    fn update_subscription(&mut self, _outputs: &[OutputId], _rate: SampleRate) -> bool {
        true
    }
    fn run(&mut self, _on_sample: &mut dyn FnMut(&RawSample, &[FusedOutput])) -> bool {
        true
    }
    fn status(&self) -> i32 {
        0
    }
    fn get_state(&mut self, _out: &mut StateBlob) -> bool {
        false
    }
    fn set_state(&mut self, state: &StateBlob) -> bool {
        self.imported = Some(*state);
        true
    }
    fn next_call_ns(&self) -> i64 {
        0
    }
}

fuzz_target!(|data: &[u8]| {
    let store = CheckpointStore::new(2024);
    let flash = Flash(data.to_vec());
    let mut engine = Sink::default();

    match store.load_from_durable(&Synced, &flash, &mut engine) {
        Ok(Transfer::Done) => {
            assert_eq!(data.len(), STATE_BLOB_LEN);
            let imported = engine.imported.expect("Done without import");
            assert_eq!(imported.as_bytes(), data);
        }
        Err(CheckpointError::Storage(StorageError::SizeMismatch)) => {
            assert_ne!(data.len(), STATE_BLOB_LEN);
            assert!(engine.imported.is_none());
        }
        other => panic!("unexpected outcome {other:?}"),
    }
});
