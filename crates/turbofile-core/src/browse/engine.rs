//! Async page loading for both panels.
//!
//! [`BrowseEngine`] is cheap to clone and safe to use from spawned tasks.
//! Each load takes a ticket from the panel's [`BrowseState`] under the
//! workspace lock, fetches without holding it, and applies the result under
//! the lock again. A newer load on the same panel aborts the fetch of the
//! older one; if the abort loses the race the ticket check still drops the
//! stale page.
//!
//! [`BrowseState`]: crate::browse::state::BrowseState

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::task::AbortHandle;

use crate::browse::state::{page_start, LoadKind};
use crate::dto::QuickSearchRequest;
use crate::error::{CoreError, CoreResult};
use crate::nav::filter::find_first_match;
use crate::nav::panel::PanelSide;
use crate::service::DirectoryService;
use crate::workspace::{lock, SharedWorkspace};

type LoadAll = Shared<BoxFuture<'static, Result<(), Arc<CoreError>>>>;

struct Inflight {
    generation: u64,
    handle: AbortHandle,
}

struct Inner {
    ws: SharedWorkspace,
    dir: Arc<dyn DirectoryService>,
    inflight: Mutex<HashMap<PanelSide, Inflight>>,
    jump_seq: [AtomicU64; 2],
    load_all: Mutex<HashMap<PanelSide, LoadAll>>,
}

#[derive(Clone)]
pub struct BrowseEngine {
    inner: Arc<Inner>,
}

fn guard<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn slot(side: PanelSide) -> usize {
    match side {
        PanelSide::Source => 0,
        PanelSide::Target => 1,
    }
}

impl BrowseEngine {
    pub fn new(ws: SharedWorkspace, dir: Arc<dyn DirectoryService>) -> Self {
        Self {
            inner: Arc::new(Inner {
                ws,
                dir,
                inflight: Mutex::new(HashMap::new()),
                jump_seq: [AtomicU64::new(0), AtomicU64::new(0)],
                load_all: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn workspace(&self) -> &SharedWorkspace {
        &self.inner.ws
    }

    /// Loads a page of the configured size.
    ///
    /// # Errors
    ///
    /// - [`CoreError::PanelNotReady`] if the panel has no location.
    /// - [`CoreError::Superseded`] if a newer load or a navigation replaced
    ///   this one; the panel is left to the newer request.
    /// - Any service error, which is also recorded as the panel's error
    ///   state.
    pub async fn load_page(&self, side: PanelSide, kind: LoadKind, force: bool) -> CoreResult<()> {
        let limit = lock(&self.inner.ws).config().browse.page_size;
        self.fetch(side, kind, force, limit).await
    }

    /// Forced reload from the top.
    pub async fn refresh(&self, side: PanelSide) -> CoreResult<()> {
        self.load_page(side, LoadKind::Reset, true).await
    }

    /// [`BrowseEngine::refresh`] that only logs failures.
    pub async fn refresh_silently(&self, side: PanelSide) {
        match self.refresh(side).await {
            Ok(()) => {}
            Err(e) if e.is_superseded() => {}
            Err(CoreError::PanelNotReady(_)) => {}
            Err(e) => tracing::debug!(?side, error = %e, "silent refresh failed"),
        }
    }

    async fn fetch(&self, side: PanelSide, kind: LoadKind, force: bool, limit: usize) -> CoreResult<()> {
        let ticket = {
            let mut ws = lock(&self.inner.ws);
            let ticket = ws.panel_mut(side).browse_mut().begin(kind, limit, force)?;
            if force {
                let request = &ticket.request;
                ws.previews_mut()
                    .invalidate_under(&request.server, &request.path);
            }
            ticket
        };
        tracing::debug!(
            ?side,
            ?kind,
            path = %ticket.request.path,
            offset = ticket.request.offset,
            "page requested"
        );

        let dir = Arc::clone(&self.inner.dir);
        let request = ticket.request.clone();
        let task = tokio::spawn(async move { dir.browse(&request).await });
        {
            let mut inflight = guard(&self.inner.inflight);
            let previous = inflight.insert(
                side,
                Inflight {
                    generation: ticket.generation,
                    handle: task.abort_handle(),
                },
            );
            if let Some(previous) = previous {
                previous.handle.abort();
            }
        }

        let result = match task.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(CoreError::Superseded),
            Err(e) => Err(CoreError::Transport(e.to_string())),
        };
        {
            let mut inflight = guard(&self.inner.inflight);
            if inflight
                .get(&side)
                .is_some_and(|f| f.generation == ticket.generation)
            {
                inflight.remove(&side);
            }
        }

        let save = {
            let mut ws = lock(&self.inner.ws);
            match result {
                Ok(page) => {
                    if !ws.panel_mut(side).browse_mut().apply(&ticket, page) {
                        tracing::debug!(?side, "stale page dropped");
                        return Err(CoreError::Superseded);
                    }
                    if kind == LoadKind::Reset {
                        ws.remember_location(side)
                    } else {
                        None
                    }
                }
                Err(e) if e.is_superseded() => return Err(e),
                Err(e) => {
                    if ws.panel_mut(side).browse_mut().fail(&ticket, e.to_string()) {
                        tracing::warn!(?side, error = %e, "page load failed");
                        return Err(e);
                    }
                    return Err(CoreError::Superseded);
                }
            }
        };

        if let Some(save) = save {
            if let Err(e) = self.inner.dir.save_client_path(&save).await {
                tracing::debug!(error = %e, "failed to save client path");
            }
        }
        Ok(())
    }

    /// Moves the window to the page containing `index` after the jump
    /// debounce. A later call for the same panel within the debounce wins
    /// and this one returns `Ok(false)` without fetching.
    pub async fn schedule_jump(&self, side: PanelSide, index: usize) -> CoreResult<bool> {
        let seq = self.inner.jump_seq[slot(side)].fetch_add(1, Ordering::SeqCst) + 1;
        let (debounce, page_size) = {
            let ws = lock(&self.inner.ws);
            let browse = &ws.config().browse;
            (browse.jump_debounce(), browse.page_size)
        };
        tokio::time::sleep(debounce).await;
        if self.inner.jump_seq[slot(side)].load(Ordering::SeqCst) != seq {
            return Ok(false);
        }
        let start = page_start(index, page_size);
        tracing::debug!(?side, index, start, "jump");
        self.load_page(side, LoadKind::Jump(start), false).await?;
        Ok(true)
    }

    /// Makes `index` reachable: appends the next page when the index is
    /// near the end of the window, jumps when it is far outside it.
    pub async fn ensure_visible(&self, side: PanelSide, index: usize) -> CoreResult<()> {
        let (jump, append) = {
            let ws = lock(&self.inner.ws);
            let margin = ws.config().browse.jump_margin();
            let state = ws.panel(side).browse();
            let jump = state.needs_jump(index, margin);
            let append = !jump && index + 1 >= state.loaded_count() && state.can_append();
            (jump, append)
        };
        if jump {
            self.schedule_jump(side, index).await.map(|_| ())
        } else if append {
            self.load_page(side, LoadKind::Append, false).await
        } else {
            Ok(())
        }
    }

    /// Loads the whole listing of the panel. Concurrent callers for the same
    /// panel share one aggregation.
    pub async fn ensure_all_loaded(&self, side: PanelSide) -> CoreResult<()> {
        let shared = {
            let mut memo = guard(&self.inner.load_all);
            match memo.get(&side) {
                Some(running) => running.clone(),
                None => {
                    let engine = self.clone();
                    let fut = async move {
                        let result = engine.load_all_pages(side).await.map_err(Arc::new);
                        guard(&engine.inner.load_all).remove(&side);
                        result
                    }
                    .boxed()
                    .shared();
                    memo.insert(side, fut.clone());
                    fut
                }
            }
        };
        shared.await.map_err(|e| match &*e {
            CoreError::Superseded => CoreError::Superseded,
            CoreError::PanelNotReady(msg) => CoreError::PanelNotReady(msg.clone()),
            other => CoreError::Service(other.to_string()),
        })
    }

    async fn load_all_pages(&self, side: PanelSide) -> CoreResult<()> {
        let (limit, restart) = {
            let ws = lock(&self.inner.ws);
            let state = ws.panel(side).browse();
            let restart = state.window_start() > 0 || state.loaded_count() == 0;
            (ws.config().browse.page_size_max, restart)
        };
        if restart {
            self.fetch(side, LoadKind::Reset, false, limit).await?;
        }
        loop {
            let before = {
                let ws = lock(&self.inner.ws);
                let state = ws.panel(side).browse();
                if !state.has_more() {
                    break;
                }
                state.loaded_count()
            };
            self.fetch(side, LoadKind::Append, false, limit).await?;
            let after = lock(&self.inner.ws).panel(side).browse().loaded_count();
            if after <= before {
                tracing::warn!(?side, loaded = after, "listing stopped growing; giving up");
                break;
            }
        }
        Ok(())
    }

    /// Finds the first entry whose name contains `keyword` and brings it
    /// into the window. Loaded entries are searched first, then the server.
    /// Returns the absolute index of the match.
    pub async fn quick_locate(&self, side: PanelSide, keyword: &str) -> CoreResult<Option<usize>> {
        let request = {
            let ws = lock(&self.inner.ws);
            let state = ws.panel(side).browse();
            if let Some((pos, _)) = find_first_match(state.items(), keyword) {
                return Ok(Some(state.window_start() + pos));
            }
            let (server, path) = match (state.server(), state.path()) {
                (Some(server), Some(path)) => (server.to_string(), path.clone()),
                _ => return Err(CoreError::PanelNotReady("no server or path".to_string())),
            };
            if !state.has_more() && state.window_start() == 0 {
                return Ok(None);
            }
            QuickSearchRequest {
                server,
                path,
                keyword: keyword.to_string(),
                show_hidden: state.show_hidden(),
            }
        };

        let hit = match self.inner.dir.quick_search(&request).await? {
            Some(hit) => hit,
            None => return Ok(None),
        };

        let (jump, page_size) = {
            let ws = lock(&self.inner.ws);
            let state = ws.panel(side).browse();
            if !state.is_browsing(&request.server, &request.path) {
                return Err(CoreError::Superseded);
            }
            let loaded = hit.index >= state.window_start()
                && hit.index < state.window_start() + state.items().len();
            (!loaded, ws.config().browse.page_size)
        };
        if jump {
            self.load_page(side, LoadKind::Jump(page_start(hit.index, page_size)), false)
                .await?;
        }
        Ok(Some(hit.index))
    }
}
