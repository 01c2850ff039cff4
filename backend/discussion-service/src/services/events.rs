/// Event service: the admin-curated events calendar
use chrono::{DateTime, Utc};
use doc_store::{
    encode, run_transaction, FilterOp, Query, RetryPolicy, SharedStore, SortDirection, Transaction,
    Write,
};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::domain::{models::timestamp, paths, Event, EventStatus, EventType};
use crate::error::{Result, ServiceError};
use crate::metrics::record_error;
use crate::middleware::{ensure_admin, Actor};
use crate::services::{clean_text, require_id, MAX_POST_CHARS, MAX_TITLE_CHARS};

pub const DEFAULT_UPCOMING_LIMIT: usize = 5;
pub const DEFAULT_FEATURED_LIMIT: usize = 3;

/// Input for a new event. Unset options take the stored defaults.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub title: String,
    pub description: String,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub location: String,
    pub image: Option<String>,
    pub status: Option<EventStatus>,
    pub event_type: Option<EventType>,
    pub max_attendees: Option<u32>,
    pub registration_link: Option<String>,
    pub is_featured: Option<bool>,
}

/// Partial update; `None` leaves a field as stored.
#[derive(Debug, Clone, Default)]
pub struct EventPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub location: Option<String>,
    pub image: Option<String>,
    pub status: Option<EventStatus>,
    pub event_type: Option<EventType>,
    pub max_attendees: Option<u32>,
    pub registration_link: Option<String>,
    pub is_featured: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventOrder {
    #[default]
    StartDate,
    CreatedAt,
    Title,
}

impl EventOrder {
    fn field(&self) -> &'static str {
        match self {
            EventOrder::StartDate => "startDate",
            EventOrder::CreatedAt => "createdAt",
            EventOrder::Title => "title",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderDirection {
    #[default]
    Asc,
    Desc,
}

impl From<OrderDirection> for SortDirection {
    fn from(direction: OrderDirection) -> Self {
        match direction {
            OrderDirection::Asc => SortDirection::Ascending,
            OrderDirection::Desc => SortDirection::Descending,
        }
    }
}

/// Listing options. The default lists every event by start date, earliest first.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub status: Option<EventStatus>,
    pub event_type: Option<EventType>,
    /// Only events starting now or later
    pub upcoming_only: bool,
    pub featured_only: bool,
    pub order: EventOrder,
    pub direction: OrderDirection,
    pub limit: Option<usize>,
}

fn check_dates(start: &DateTime<Utc>, end: Option<&DateTime<Utc>>) -> Result<()> {
    match end {
        Some(end) if end < start => Err(ServiceError::validation(
            "validation/invalid-dates",
            "End date must not be before the start date",
        )),
        _ => Ok(()),
    }
}

#[derive(Clone)]
pub struct EventService {
    store: SharedStore,
    retry: RetryPolicy,
}

impl EventService {
    pub fn new(store: SharedStore, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    /// Add an event to the calendar. Admin only.
    pub async fn add_event(&self, actor: &Actor, input: NewEvent) -> Result<Event> {
        ensure_admin(actor)?;
        let title = clean_text("Title", &input.title, MAX_TITLE_CHARS)?;
        let description = clean_text("Description", &input.description, MAX_POST_CHARS)?;
        let location = clean_text("Location", &input.location, MAX_TITLE_CHARS)?;
        check_dates(&input.start_date, input.end_date.as_ref())?;

        let now = Utc::now();
        let event = Event {
            id: Uuid::new_v4().to_string(),
            title,
            description,
            start_date: input.start_date,
            end_date: input.end_date,
            location,
            image: input.image.map(|url| url.trim().to_string()).unwrap_or_default(),
            status: input.status.unwrap_or_default(),
            event_type: input.event_type.unwrap_or_default(),
            max_attendees: input.max_attendees,
            registration_link: input.registration_link,
            is_featured: input.is_featured.unwrap_or(false),
            created_by: actor.id(),
            created_at: now,
            updated_at: now,
        };

        let result = self
            .store
            .commit(
                &[],
                &[Write::Create {
                    path: paths::event(&event.id)?,
                    data: encode(&event)?,
                }],
            )
            .await;
        if let Err(e) = result {
            let err = ServiceError::from(e);
            record_error("add_event", err.code());
            return Err(err);
        }

        info!(event_id = %event.id, actor = %actor.user_id, "Event added");
        Ok(event)
    }

    pub async fn get_event(&self, event_id: &str) -> Result<Event> {
        require_id("Event ID", event_id)?;
        let doc = self
            .store
            .get(&paths::event(event_id)?)
            .await?
            .ok_or_else(|| ServiceError::not_found("Event", event_id))?;
        Ok(doc.decode()?)
    }

    pub async fn list_events(&self, filter: &EventFilter) -> Result<Vec<Event>> {
        let query = Self::list_query(filter, Utc::now())?;
        self.store
            .query(&query)
            .await?
            .iter()
            .map(|doc| doc.decode().map_err(ServiceError::from))
            .collect()
    }

    /// Published events that have not started yet, soonest first.
    pub async fn upcoming_events(&self, limit: Option<usize>) -> Result<Vec<Event>> {
        self.list_events(&EventFilter {
            status: Some(EventStatus::Published),
            upcoming_only: true,
            limit: Some(limit.unwrap_or(DEFAULT_UPCOMING_LIMIT)),
            ..Default::default()
        })
        .await
    }

    /// Published featured events, soonest first.
    pub async fn featured_events(&self, limit: Option<usize>) -> Result<Vec<Event>> {
        self.list_events(&EventFilter {
            status: Some(EventStatus::Published),
            featured_only: true,
            limit: Some(limit.unwrap_or(DEFAULT_FEATURED_LIMIT)),
            ..Default::default()
        })
        .await
    }

    /// Query for a listing evaluated at `now`.
    pub fn list_query(filter: &EventFilter, now: DateTime<Utc>) -> Result<Query> {
        let mut query = Query::new(paths::events()?);
        if let Some(status) = filter.status {
            query = query.where_eq("status", status.as_str());
        }
        if let Some(event_type) = filter.event_type {
            query = query.where_eq("type", event_type.as_str());
        }
        if filter.upcoming_only {
            query = query.filter("startDate", FilterOp::Ge, timestamp::format(&now));
        }
        if filter.featured_only {
            query = query.where_eq("isFeatured", true);
        }
        query = query.order_by(filter.order.field(), filter.direction.into());
        if let Some(limit) = filter.limit {
            query = query.limit(limit);
        }
        Ok(query)
    }

    /// Merge `patch` into a stored event. Admin only.
    pub async fn update_event(&self, actor: &Actor, event_id: &str, patch: EventPatch) -> Result<Event> {
        ensure_admin(actor)?;
        require_id("Event ID", event_id)?;
        let title = patch
            .title
            .as_deref()
            .map(|t| clean_text("Title", t, MAX_TITLE_CHARS))
            .transpose()?;
        let description = patch
            .description
            .as_deref()
            .map(|d| clean_text("Description", d, MAX_POST_CHARS))
            .transpose()?;
        let location = patch
            .location
            .as_deref()
            .map(|l| clean_text("Location", l, MAX_TITLE_CHARS))
            .transpose()?;
        let path = paths::event(event_id)?;

        let result = run_transaction(&self.retry, || {
            let store = self.store.clone();
            let path = path.clone();
            let patch = patch.clone();
            let title = title.clone();
            let description = description.clone();
            let location = location.clone();
            async move {
                let mut tx = Transaction::begin(store.as_ref());
                let mut event: Event = tx
                    .get_as(&path)
                    .await?
                    .ok_or_else(|| ServiceError::not_found("Event", path.id()))?;

                if let Some(title) = title {
                    event.title = title;
                }
                if let Some(description) = description {
                    event.description = description;
                }
                if let Some(location) = location {
                    event.location = location;
                }
                if let Some(start) = patch.start_date {
                    event.start_date = start;
                }
                if patch.end_date.is_some() {
                    event.end_date = patch.end_date;
                }
                if let Some(image) = patch.image {
                    event.image = image.trim().to_string();
                }
                if let Some(status) = patch.status {
                    event.status = status;
                }
                if let Some(event_type) = patch.event_type {
                    event.event_type = event_type;
                }
                if patch.max_attendees.is_some() {
                    event.max_attendees = patch.max_attendees;
                }
                if patch.registration_link.is_some() {
                    event.registration_link = patch.registration_link;
                }
                if let Some(featured) = patch.is_featured {
                    event.is_featured = featured;
                }
                check_dates(&event.start_date, event.end_date.as_ref())?;
                event.updated_at = Utc::now();

                tx.update(path, encode(&event)?, Vec::new());
                tx.commit().await?;
                Ok::<_, ServiceError>(event)
            }
        })
        .await;

        match &result {
            Ok(event) => info!(event_id = %event.id, actor = %actor.user_id, "Event updated"),
            Err(err) => record_error("update_event", err.code()),
        }
        result
    }

    /// Remove an event. Admin only.
    pub async fn delete_event(&self, actor: &Actor, event_id: &str) -> Result<()> {
        ensure_admin(actor)?;
        require_id("Event ID", event_id)?;
        let path = paths::event(event_id)?;

        let result = run_transaction(&self.retry, || {
            let store = self.store.clone();
            let path = path.clone();
            async move {
                let mut tx = Transaction::begin(store.as_ref());
                if tx.get(&path).await?.is_none() {
                    return Err(ServiceError::not_found("Event", path.id()));
                }
                tx.delete(path);
                tx.commit().await?;
                Ok::<_, ServiceError>(())
            }
        })
        .await;

        match &result {
            Ok(()) => info!(event_id, actor = %actor.user_id, "Event deleted"),
            Err(err) => record_error("delete_event", err.code()),
        }
        result
    }
}
