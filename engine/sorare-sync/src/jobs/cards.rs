//! Card refresh: one main-sheet row per gallery card

use super::{cell, index_rows, JobContext, UPDATE_CARDS_SESSION};
use crate::client::at;
use crate::models::{main_sheet_headers, CardItem, CardRecord, NextGame, SLUG_COLUMN};
use crate::notify::completion_message;
use crate::queries::{
    card_details_query, ALL_CARDS_QUERY, GALLERY_PAGE_SIZE, GALLERY_RARITIES, PROJECTION_QUERY,
};
use crate::sheet::Table;
use anyhow::{anyhow, Context};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use sync_core::{BatchJob, RunReport};
use tracing::{debug, info, warn};

/// Rows written across all segments of a session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardsProgress {
    pub updated: usize,
    pub appended: usize,
}

/// Refreshes every card of the user's gallery in the main sheet
pub struct CardsJob {
    ctx: JobContext,
    user_slug: String,
    sheet: Box<dyn Table>,
    details_query: String,
    row_index: HashMap<String, usize>,
    pending: Vec<CardRecord>,
}

impl CardsJob {
    pub fn new(ctx: JobContext, user_slug: impl Into<String>, sheet: Box<dyn Table>) -> Self {
        Self {
            ctx,
            user_slug: user_slug.into(),
            sheet,
            details_query: card_details_query(),
            row_index: HashMap::new(),
            pending: Vec::new(),
        }
    }

    async fn fetch_gallery(&self) -> anyhow::Result<Vec<CardItem>> {
        let mut cards = Vec::new();
        let mut seen = HashSet::new();
        let mut cursor: Option<String> = None;

        loop {
            let variables = json!({
                "userSlug": self.user_slug,
                "rarities": GALLERY_RARITIES,
                "cursor": cursor,
                "first": GALLERY_PAGE_SIZE,
            });

            let data = self
                .ctx
                .client
                .fetch(ALL_CARDS_QUERY, variables)
                .await
                .context("Failed to fetch gallery page")?;

            let connection = at(&data, &["user", "cards"])
                .ok_or_else(|| anyhow!("user {} returned no card list", self.user_slug))?;

            let nodes = at(connection, &["nodes"]).and_then(Value::as_array);
            for node in nodes.into_iter().flatten() {
                match serde_json::from_value::<CardItem>(node.clone()) {
                    Ok(card) if !card.slug.is_empty() => {
                        if seen.insert(card.slug.clone()) {
                            cards.push(card);
                        }
                    }
                    Ok(_) => debug!("Skipping gallery entry without slug"),
                    Err(e) => warn!("Skipping undecodable gallery entry: {}", e),
                }
            }

            let has_next = at(connection, &["pageInfo", "hasNextPage"])
                .and_then(Value::as_bool)
                .unwrap_or(false);
            let end_cursor = at(connection, &["pageInfo", "endCursor"])
                .and_then(Value::as_str)
                .map(str::to_string);

            match end_cursor {
                Some(next) if has_next => cursor = Some(next),
                _ => break,
            }
        }

        Ok(cards)
    }

    async fn fetch_projection(&self, player_slug: &str, game: &NextGame) -> Option<Value> {
        let variables = json!({ "playerSlug": player_slug, "gameId": game.api_id() });

        match self.ctx.client.fetch(PROJECTION_QUERY, variables).await {
            Ok(data) => at(&data, &["football", "player", "playerGameScore"]).cloned(),
            Err(e) => {
                warn!("No projection for {} in game {}: {}", player_slug, game.id, e);
                None
            }
        }
    }
}

#[async_trait::async_trait]
impl BatchJob for CardsJob {
    type Item = CardItem;
    type State = CardsProgress;

    fn session_key(&self) -> &str {
        UPDATE_CARDS_SESSION
    }

    async fn plan(&mut self) -> anyhow::Result<(Vec<CardItem>, CardsProgress)> {
        let cards = self.fetch_gallery().await?;
        info!("Found {} cards in the gallery of {}", cards.len(), self.user_slug);
        Ok((cards, CardsProgress::default()))
    }

    async fn prepare(&mut self, _state: &CardsProgress) -> anyhow::Result<()> {
        self.sheet.ensure_headers(&main_sheet_headers())?;
        self.row_index =
            index_rows(&self.sheet.records(), |r| cell(r, SLUG_COLUMN).map(str::to_string));
        debug!("Main sheet holds {} cards", self.row_index.len());
        Ok(())
    }

    async fn process(&mut self, item: &CardItem, _state: &mut CardsProgress) -> anyhow::Result<()> {
        let data = self
            .ctx
            .client
            .fetch(&self.details_query, json!({ "cardSlug": item.slug }))
            .await
            .with_context(|| format!("Failed to fetch details of card {}", item.slug))?;

        let card = at(&data, &["anyCard"]).ok_or_else(|| anyhow!("card {} not found", item.slug))?;

        let projection = match (
            at(card, &["player", "slug"]).and_then(Value::as_str),
            at(card, &["player"]).and_then(NextGame::from_player),
        ) {
            (Some(player_slug), Some(game)) => self.fetch_projection(player_slug, &game).await,
            _ => None,
        };

        let record =
            CardRecord::from_details(item, card, projection.as_ref(), &self.ctx.rates, Utc::now());
        debug!("Mapped card {} ({})", record.slug, record.player_name);
        self.pending.push(record);
        Ok(())
    }

    async fn flush(&mut self, state: &mut CardsProgress) -> anyhow::Result<()> {
        let pending = std::mem::take(&mut self.pending);
        if pending.is_empty() {
            return Ok(());
        }

        let mut updated = Vec::new();
        let mut appended = Vec::new();
        let mut first_new_row = self.sheet.row_count();

        for record in pending {
            match self.row_index.get(&record.slug) {
                Some(&row) => updated.push((row, record.to_row())),
                None => {
                    self.row_index.insert(record.slug.clone(), first_new_row);
                    first_new_row += 1;
                    appended.push(record.to_row());
                }
            }
        }

        let (update_count, append_count) = (updated.len(), appended.len());
        self.sheet.write_rows(updated).context("Failed to rewrite card rows")?;
        state.updated += update_count;

        self.sheet.append_rows(appended).context("Failed to append card rows")?;
        state.appended += append_count;
        info!(
            "Main sheet flushed: {} rows updated, {} rows added so far",
            state.updated, state.appended
        );
        Ok(())
    }

    async fn on_complete(&mut self, report: &RunReport, state: &CardsProgress) {
        let message = format!(
            "{}\n📄 Rows: {} updated, {} added, {} failed",
            completion_message("Cards Updated", report.elapsed),
            state.updated,
            state.appended,
            report.failed
        );
        self.ctx.notifier.notify(&message).await;
    }
}
