use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use validator::Validate;

use crate::domain::{EventStatus, EventType};
use crate::error::Result;
use crate::handlers::{load_actor, validate};
use crate::middleware::Identity;
use crate::services::{EventFilter, EventOrder, EventPatch, NewEvent, OrderDirection};
use crate::AppState;

const MAX_LIST_LIMIT: usize = 100;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListEventsQuery {
    pub status: Option<EventStatus>,
    #[serde(rename = "type")]
    pub event_type: Option<EventType>,
    #[serde(default)]
    pub upcoming_only: bool,
    #[serde(default)]
    pub featured_only: bool,
    #[serde(default)]
    pub order_by: EventOrder,
    #[serde(default)]
    pub order_direction: OrderDirection,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateEventRequest {
    #[validate(length(min = 1, max = 300))]
    pub title: String,
    #[validate(length(min = 1, max = 50000))]
    pub description: String,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    #[validate(length(min = 1, max = 300))]
    pub location: String,
    pub image: Option<String>,
    pub status: Option<EventStatus>,
    #[serde(rename = "type")]
    pub event_type: Option<EventType>,
    #[validate(range(min = 1))]
    pub max_attendees: Option<u32>,
    #[validate(url)]
    pub registration_link: Option<String>,
    pub is_featured: Option<bool>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEventRequest {
    #[validate(length(min = 1, max = 300))]
    pub title: Option<String>,
    #[validate(length(min = 1, max = 50000))]
    pub description: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    #[validate(length(min = 1, max = 300))]
    pub location: Option<String>,
    pub image: Option<String>,
    pub status: Option<EventStatus>,
    #[serde(rename = "type")]
    pub event_type: Option<EventType>,
    #[validate(range(min = 1))]
    pub max_attendees: Option<u32>,
    #[validate(url)]
    pub registration_link: Option<String>,
    pub is_featured: Option<bool>,
}

/// GET /api/v1/events
pub async fn list_events(
    state: web::Data<AppState>,
    query: web::Query<ListEventsQuery>,
) -> Result<HttpResponse> {
    let query = query.into_inner();
    let filter = EventFilter {
        status: query.status,
        event_type: query.event_type,
        upcoming_only: query.upcoming_only,
        featured_only: query.featured_only,
        order: query.order_by,
        direction: query.order_direction,
        limit: query.limit.map(|l| l.min(MAX_LIST_LIMIT)),
    };
    let events = state.events.list_events(&filter).await?;
    Ok(HttpResponse::Ok().json(events))
}

/// GET /api/v1/events/upcoming
pub async fn upcoming_events(
    state: web::Data<AppState>,
    query: web::Query<LimitQuery>,
) -> Result<HttpResponse> {
    let limit = query.limit.map(|l| l.min(MAX_LIST_LIMIT));
    let events = state.events.upcoming_events(limit).await?;
    Ok(HttpResponse::Ok().json(events))
}

/// GET /api/v1/events/featured
pub async fn featured_events(
    state: web::Data<AppState>,
    query: web::Query<LimitQuery>,
) -> Result<HttpResponse> {
    let limit = query.limit.map(|l| l.min(MAX_LIST_LIMIT));
    let events = state.events.featured_events(limit).await?;
    Ok(HttpResponse::Ok().json(events))
}

/// GET /api/v1/events/{event_id}
pub async fn get_event(state: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse> {
    let event = state.events.get_event(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(event))
}

/// POST /api/v1/events
pub async fn add_event(
    state: web::Data<AppState>,
    identity: Identity,
    body: web::Json<CreateEventRequest>,
) -> Result<HttpResponse> {
    validate(&*body)?;
    let actor = load_actor(&state, &identity).await?;
    let body = body.into_inner();

    let event = state
        .events
        .add_event(
            &actor,
            NewEvent {
                title: body.title,
                description: body.description,
                start_date: body.start_date,
                end_date: body.end_date,
                location: body.location,
                image: body.image,
                status: body.status,
                event_type: body.event_type,
                max_attendees: body.max_attendees,
                registration_link: body.registration_link,
                is_featured: body.is_featured,
            },
        )
        .await?;
    Ok(HttpResponse::Created().json(event))
}

/// PATCH /api/v1/events/{event_id}
pub async fn update_event(
    state: web::Data<AppState>,
    identity: Identity,
    path: web::Path<String>,
    body: web::Json<UpdateEventRequest>,
) -> Result<HttpResponse> {
    validate(&*body)?;
    let actor = load_actor(&state, &identity).await?;
    let body = body.into_inner();

    let event = state
        .events
        .update_event(
            &actor,
            &path.into_inner(),
            EventPatch {
                title: body.title,
                description: body.description,
                start_date: body.start_date,
                end_date: body.end_date,
                location: body.location,
                image: body.image,
                status: body.status,
                event_type: body.event_type,
                max_attendees: body.max_attendees,
                registration_link: body.registration_link,
                is_featured: body.is_featured,
            },
        )
        .await?;
    Ok(HttpResponse::Ok().json(event))
}

/// DELETE /api/v1/events/{event_id}
pub async fn delete_event(
    state: web::Data<AppState>,
    identity: Identity,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let actor = load_actor(&state, &identity).await?;
    state.events.delete_event(&actor, &path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}
