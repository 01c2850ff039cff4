pub mod models;
pub mod paths;

pub use models::{
    Comment, Event, EventStatus, EventType, Post, Role, UserProfile, VoteDirection, VoteOutcome,
    VoteRecord, VoteState, VoteTransition,
};
