/*
 * Copyright (C) 2020 Oakes, Gregory <gregoryoakes@fastmail.com>
 * Author: Oakes, Gregory <gregory.oakes@fastmail.com>
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as
 * published by the Free Software Foundation, either version 3 of the
 * License, or (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program.  If not, see <http://www.gnu.org/licenses/>.
 */

//! The browser-resident side of the history protocol: a page-session cache
//! that accumulates metadata pages, caches fetched payloads independently,
//! and coordinates one-shot visibility-triggered fetches.

use std::{
    cell::{Cell, RefCell},
    collections::{HashMap, HashSet},
};

use async_trait::async_trait;

use crate::{
    history::{HistoryPage, HistoryPageItem, ImageResp},
    Error,
};

/// The server as seen from a client: one metadata page at a time, full
/// payloads resolved individually by id.
#[async_trait(?Send)]
pub trait HistoryApi {
    async fn list_page(&self, page: u32, limit: u32) -> Result<HistoryPage, Error>;
    async fn fetch_image(&self, id: i32) -> Result<String, Error>;
}

/// `HistoryApi` over HTTP against the routes in `crate::history`.
pub struct RestHistoryApi {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl RestHistoryApi {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        RestHistoryApi {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            token: token.into(),
        }
    }
}

#[async_trait(?Send)]
impl HistoryApi for RestHistoryApi {
    async fn list_page(&self, page: u32, limit: u32) -> Result<HistoryPage, Error> {
        let url = format!(
            "{}/api/history-metadata?page={}&limit={}",
            self.base_url, page, limit
        );
        let resp = self
            .http
            .get(url.as_str())
            .bearer_auth(&self.token)
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.json().await?)
    }

    async fn fetch_image(&self, id: i32) -> Result<String, Error> {
        let url = format!("{}/api/image/{}", self.base_url, id);
        let resp = self
            .http
            .get(url.as_str())
            .bearer_auth(&self.token)
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.json::<ImageResp>().await?.image_data)
    }
}

/// Visual lifecycle of one history tile. `Loaded` and `Failed` are
/// terminal; nothing transitions back to `Placeholder` or `Loading`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileState {
    Placeholder,
    Loading,
    Loaded,
    Failed,
}

impl TileState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TileState::Loaded | TileState::Failed)
    }
}

/// History state for one page session: the accumulated metadata pages, the
/// payload cache, and the pagination cursor. Everything runs on one logical
/// thread, so interior mutability is `Cell`/`RefCell`; borrows are never
/// held across an await.
pub struct HistoryCache {
    items: RefCell<Vec<HistoryPageItem>>,
    images: RefCell<HashMap<i32, String>>,
    tiles: RefCell<HashMap<i32, TileState>>,
    next_page: Cell<u32>,
    page_size: u32,
    has_more: Cell<bool>,
    loading: Cell<bool>,
}

impl HistoryCache {
    pub fn new(page_size: u32) -> Self {
        assert!(page_size > 0, "page size must be positive");
        HistoryCache {
            items: RefCell::new(Vec::new()),
            images: RefCell::new(HashMap::new()),
            tiles: RefCell::new(HashMap::new()),
            next_page: Cell::new(0),
            page_size,
            has_more: Cell::new(true),
            loading: Cell::new(false),
        }
    }

    /// Requests the cursor page and appends it. At most one load is in
    /// flight: a call made while another is pending is a no-op returning
    /// `Ok(false)`. On failure the accumulated items and the cursor are
    /// untouched, so calling again retries the same page.
    pub async fn load_next_page<A>(&self, api: &A) -> Result<bool, Error>
    where
        A: HistoryApi + ?Sized,
    {
        if self.loading.replace(true) {
            return Ok(false);
        }
        let res = api.list_page(self.next_page.get(), self.page_size).await;
        self.loading.set(false);

        let page = res?;
        {
            let mut tiles = self.tiles.borrow_mut();
            for item in &page.items {
                tiles.entry(item.id).or_insert(TileState::Placeholder);
            }
        }
        // Server order is display order; distinctness is the server's call,
        // so nothing is deduplicated here.
        self.items.borrow_mut().extend(page.items);
        self.has_more.set(page.has_more);
        self.next_page.set(self.next_page.get() + 1);
        Ok(true)
    }

    /// Front-inserts a just-generated item and seeds its payload so it
    /// never triggers a network fetch.
    pub fn prepend_new(&self, item: HistoryPageItem, payload: String) {
        let id = item.id;
        self.items.borrow_mut().insert(0, item);
        self.images.borrow_mut().insert(id, payload);
        self.tiles.borrow_mut().insert(id, TileState::Loaded);
    }

    /// The payload for `id`, from cache when present. Concurrent calls for
    /// an uncached id may race to the network; both fetch identical server
    /// data, so the write is last-write-wins.
    pub async fn resolve_image<A>(&self, api: &A, id: i32) -> Result<String, Error>
    where
        A: HistoryApi + ?Sized,
    {
        if let Some(cached) = self.images.borrow().get(&id).cloned() {
            return Ok(cached);
        }
        let payload = api.fetch_image(id).await?;
        self.images.borrow_mut().insert(id, payload.clone());
        Ok(payload)
    }

    pub fn items(&self) -> Vec<HistoryPageItem> {
        self.items.borrow().clone()
    }

    pub fn has_more(&self) -> bool {
        self.has_more.get()
    }

    pub fn is_loading(&self) -> bool {
        self.loading.get()
    }

    pub fn cached_image(&self, id: i32) -> Option<String> {
        self.images.borrow().get(&id).cloned()
    }

    /// Current visual state of a tile; unknown ids are placeholders.
    pub fn tile_state(&self, id: i32) -> TileState {
        self.tiles
            .borrow()
            .get(&id)
            .copied()
            .unwrap_or(TileState::Placeholder)
    }

    fn mark(&self, id: i32, next: TileState) {
        let mut tiles = self.tiles.borrow_mut();
        let state = tiles.entry(id).or_insert(TileState::Placeholder);
        if !state.is_terminal() {
            *state = next;
        }
    }
}

/// Owns the one-shot visibility protocol: the first time a tile enters the
/// viewport's proximity region it is resolved, and the trigger is consumed
/// whether the fetch succeeds or not. Re-entering view never re-triggers,
/// and a failed tile stays failed without automatic retry.
pub struct LazyLoadCoordinator {
    triggered: RefCell<HashSet<i32>>,
}

impl LazyLoadCoordinator {
    pub fn new() -> Self {
        LazyLoadCoordinator {
            triggered: RefCell::new(HashSet::new()),
        }
    }

    /// Reports that `id`'s tile became visible; returns its state once any
    /// triggered fetch settles.
    pub async fn item_visible<A>(&self, cache: &HistoryCache, api: &A, id: i32) -> TileState
    where
        A: HistoryApi + ?Sized,
    {
        if !self.triggered.borrow_mut().insert(id) {
            return cache.tile_state(id);
        }
        if cache.tile_state(id).is_terminal() {
            return cache.tile_state(id);
        }
        cache.mark(id, TileState::Loading);
        match cache.resolve_image(api, id).await {
            Ok(_) => cache.mark(id, TileState::Loaded),
            Err(_) => cache.mark(id, TileState::Failed),
        }
        cache.tile_state(id)
    }
}

impl Default for LazyLoadCoordinator {
    fn default() -> Self {
        LazyLoadCoordinator::new()
    }
}
