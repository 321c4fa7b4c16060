//! AppBuilder - ReturnService の構築とワイヤリング
//!
//! # Fail-fast 設計
//! - store は必須。未設定のまま build() すると BuildError::MissingStore
//! - clock / id generator / event sink は省略時にデフォルト実装を使う

use std::sync::Arc;

use crate::app::config::ReturnsConfig;
use crate::app::service::ReturnService;
use crate::impls::TracingEventSink;
use crate::ports::{Clock, EventSink, IdGenerator, ReturnStore, SystemClock, UlidGenerator};

/// AppBuilder は ReturnService を構築
///
/// # 使用例
/// ```ignore
/// let service = AppBuilder::new()
///     .store(SqliteReturnStore::open("returns.db")?)
///     .config(ReturnsConfig::load("returns.toml")?)
///     .build()?;
/// ```
pub struct AppBuilder {
    store: Option<Arc<dyn ReturnStore>>,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
    events: Option<Arc<dyn EventSink>>,
    config: ReturnsConfig,
}

/// BuildError はアプリケーション構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("no ReturnStore configured; call AppBuilder::store() before build()")]
    MissingStore,
}

impl AppBuilder {
    pub fn new() -> Self {
        Self {
            store: None,
            clock: None,
            ids: None,
            events: None,
            config: ReturnsConfig::default(),
        }
    }

    pub fn store(mut self, store: impl ReturnStore + 'static) -> Self {
        self.store = Some(Arc::new(store));
        self
    }

    /// Shares an already wrapped store.
    pub fn shared_store(mut self, store: Arc<dyn ReturnStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }

    pub fn id_generator(mut self, ids: impl IdGenerator + 'static) -> Self {
        self.ids = Some(Arc::new(ids));
        self
    }

    pub fn event_sink(mut self, events: impl EventSink + 'static) -> Self {
        self.events = Some(Arc::new(events));
        self
    }

    pub fn config(mut self, config: ReturnsConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<ReturnService, BuildError> {
        let store = self.store.ok_or(BuildError::MissingStore)?;
        let clock: Arc<dyn Clock> = match self.clock {
            Some(clock) => clock,
            None => Arc::new(SystemClock),
        };
        let ids: Arc<dyn IdGenerator> = match self.ids {
            Some(ids) => ids,
            None => Arc::new(UlidGenerator::new(SystemClock)),
        };
        let events: Arc<dyn EventSink> = match self.events {
            Some(events) => events,
            None => Arc::new(TracingEventSink),
        };
        Ok(ReturnService::new(store, clock, ids, events, self.config))
    }
}

impl Default for AppBuilder {
    fn default() -> Self {
        Self::new()
    }
}
