mod api;
mod config;
mod core;
mod error;
mod infra;
mod models;

use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::infra::Warehouse;

/// 空闲会话的清理周期
const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

pub mod ax_state {
    use super::*;
    use crate::config::DEFAULT_SESSION_TTL;
    use crate::core::session::ExplorerSession;
    use crate::core::widgets::FilterPolicy;
    use crate::error::{ExplorerError, Result};
    use dashmap::DashMap;
    use tokio::sync::Mutex;
    use uuid::Uuid;

    pub struct SessionSlot {
        /// 每个会话一把锁: 同一会话串行处理，不同会话互不阻塞
        pub session: Arc<Mutex<ExplorerSession>>,
        pub last_access: Instant,
    }

    pub struct AppState {
        pub warehouse: Warehouse,
        pub sessions: DashMap<Uuid, SessionSlot>,
        pub session_ttl: Duration,
        pub policy: FilterPolicy,
        pub excluded_schemas: Vec<String>,
    }

    impl AppState {
        pub fn new(warehouse: Warehouse, policy: FilterPolicy, excluded_schemas: Vec<String>) -> Self {
            Self {
                warehouse,
                sessions: DashMap::new(),
                session_ttl: DEFAULT_SESSION_TTL,
                policy,
                excluded_schemas,
            }
        }

        pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
            self.session_ttl = ttl;
            self
        }

        pub fn open_session(&self) -> Uuid {
            let session = ExplorerSession::new(self.policy);
            let id = session.id();
            self.sessions.insert(
                id,
                SessionSlot {
                    session: Arc::new(Mutex::new(session)),
                    last_access: Instant::now(),
                },
            );
            id
        }

        /// 取出会话句柄并刷新访问时间；不持有 DashMap 的引用跨越 await
        pub fn session(&self, id: Uuid) -> Result<Arc<Mutex<ExplorerSession>>> {
            let mut slot = self.sessions.get_mut(&id).ok_or(ExplorerError::SessionNotFound(id))?;
            slot.last_access = Instant::now();
            Ok(Arc::clone(&slot.session))
        }

        pub fn close_session(&self, id: Uuid) -> Result<()> {
            self.sessions
                .remove(&id)
                .map(|_| ())
                .ok_or(ExplorerError::SessionNotFound(id))
        }

        /// 移除在 `now` 时已空闲超过 TTL 的会话，返回移除个数
        pub fn evict_idle(&self, now: Instant) -> usize {
            let mut evicted = 0;
            self.sessions.retain(|_, slot| {
                let keep = now.saturating_duration_since(slot.last_access) < self.session_ttl;
                if !keep {
                    evicted += 1;
                }
                keep
            });
            evicted
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;
    let warehouse = Warehouse::connect(&config).await?;
    let state = Arc::new(
        ax_state::AppState::new(warehouse, config.policy, config.excluded_schemas.clone())
            .with_session_ttl(config.session_ttl),
    );

    let sweeper = Arc::clone(&state);
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(SESSION_SWEEP_INTERVAL);
        loop {
            tick.tick().await;
            let evicted = sweeper.evict_idle(Instant::now());
            if evicted > 0 {
                info!("清理空闲会话 {} 个，剩余 {} 个", evicted, sweeper.sessions.len());
            }
        }
    });

    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    let app = api::router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    info!("Table Explorer 运行在 http://{}", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
