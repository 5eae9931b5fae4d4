//! Codec cache invalidated by ABI updates

use std::collections::HashMap;

use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{debug, info, warn};

use super::{Codec, CodecId};
use crate::store::AbiEvent;

/// Codecs by id.
///
/// Every ABI update empties the cache, except for the static codecs that do
/// not depend on any ABI. Pending [`AbiEvent`]s are drained before each
/// lookup, so a codec built from a replaced ABI is never served.
#[derive(Debug)]
pub struct CodecCache {
    statics: HashMap<CodecId, Codec>,
    codecs: HashMap<CodecId, Codec>,
    events: broadcast::Receiver<AbiEvent>,
}

impl CodecCache {
    pub fn new(events: broadcast::Receiver<AbiEvent>) -> Self {
        Self {
            statics: HashMap::new(),
            codecs: HashMap::new(),
            events,
        }
    }

    /// Add a codec that survives invalidation
    pub fn insert_static(&mut self, id: CodecId, codec: Codec) {
        info!(codec = %id, schema_id = codec.id(), "register static codec");
        self.statics.insert(id, codec);
    }

    pub fn insert(&mut self, id: CodecId, codec: Codec) {
        debug!(codec = %id, schema_id = codec.id(), "register codec into cache");
        self.codecs.insert(id, codec);
    }

    pub fn get(&mut self, id: &CodecId) -> Option<Codec> {
        self.sync();
        self.statics
            .get(id)
            .or_else(|| self.codecs.get(id))
            .cloned()
    }

    /// Drop every ABI-derived codec
    pub fn reset(&mut self) {
        if !self.codecs.is_empty() {
            info!(dropped = self.codecs.len(), "reset codec cache");
        }
        self.codecs.clear();
    }

    /// Number of cached codecs, static ones included
    pub fn len(&mut self) -> usize {
        self.sync();
        self.statics.len() + self.codecs.len()
    }

    pub fn is_empty(&mut self) -> bool {
        self.len() == 0
    }

    fn sync(&mut self) {
        loop {
            match self.events.try_recv() {
                Ok(AbiEvent::Updated {
                    account, block_num, ..
                }) => {
                    debug!(%account, block_num, "ABI updated, invalidate codecs");
                    self.reset();
                }
                Err(TryRecvError::Lagged(missed)) => {
                    warn!(missed, "missed ABI events, invalidate codecs");
                    self.reset();
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
    }
}
