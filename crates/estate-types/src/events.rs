use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Property, PropertyMessage, PropertyStatus, User};

/// A realtime channel a connection can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Topic {
    /// Inquiry thread between one sender and a property's owner.
    Thread { property_id: Uuid, sender_id: Uuid },
    /// Changes to a single listing.
    Property { property_id: Uuid },
    /// Events addressed to one user (favorites, inbox).
    User { user_id: Uuid },
    /// Admin-only feed (user moderation).
    Admin,
}

/// Events pushed over the realtime gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum RealtimeEvent {
    /// Server confirms successful authentication
    Ready { user_id: Uuid },

    /// Subscription request accepted
    Subscribed { topics: Vec<Topic> },

    /// Subscription request refused for one topic
    SubscribeDenied { topic: Topic, reason: String },

    /// A message was appended to a thread
    MessageCreate { message: PropertyMessage },

    /// A message's status or reply changed
    MessageUpdate { message: PropertyMessage },

    /// A listing was edited
    PropertyUpdate { property: Property },

    /// A listing was removed
    PropertyDelete { property_id: Uuid },

    /// The favorited state of a listing changed for a user
    FavoriteUpdate {
        user_id: Uuid,
        property_id: Uuid,
        favorited: bool,
    },

    /// An account was changed by an admin
    UserUpdate { user: User },

    /// An account was deleted by an admin
    UserDelete { user_id: Uuid },
}

impl RealtimeEvent {
    /// Topics this event is delivered on. Connection-level events (`Ready`,
    /// `Subscribed`, `SubscribeDenied`) have none and are sent directly.
    pub fn topics(&self) -> Vec<Topic> {
        match self {
            Self::MessageCreate { message } | Self::MessageUpdate { message } => vec![
                Topic::Thread {
                    property_id: message.property_id,
                    sender_id: message.sender_id,
                },
                Topic::Admin,
            ],
            Self::PropertyUpdate { property } => vec![Topic::Property {
                property_id: property.id,
            }],
            Self::PropertyDelete { property_id } => vec![Topic::Property {
                property_id: *property_id,
            }],
            Self::FavoriteUpdate { user_id, .. } => vec![Topic::User { user_id: *user_id }],
            Self::UserUpdate { .. } | Self::UserDelete { .. } => vec![Topic::Admin],
            Self::Ready { .. } | Self::Subscribed { .. } | Self::SubscribeDenied { .. } => vec![],
        }
    }

    /// The only non-admin user allowed to see this event, if it is private.
    /// Edits that leave a listing in draft belong to its owner.
    pub fn restricted_to(&self) -> Option<Uuid> {
        match self {
            Self::PropertyUpdate { property } if property.status == PropertyStatus::Draft => {
                Some(property.owner_id)
            }
            _ => None,
        }
    }
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum RealtimeCommand {
    /// Authenticate the WebSocket connection
    Identify { token: String },

    /// Start receiving events for the given topics
    Subscribe { topics: Vec<Topic> },

    /// Stop receiving events for the given topics
    Unsubscribe { topics: Vec<Topic> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_wire_format() {
        let id = Uuid::nil();
        let json = serde_json::to_value(Topic::Property { property_id: id }).unwrap();
        assert_eq!(json["kind"], "property");
        assert_eq!(json["property_id"], id.to_string());

        let admin: Topic = serde_json::from_str(r#"{"kind":"admin"}"#).unwrap();
        assert_eq!(admin, Topic::Admin);
    }

    #[test]
    fn command_wire_format() {
        let cmd: RealtimeCommand = serde_json::from_str(
            r#"{"type":"Subscribe","data":{"topics":[{"kind":"admin"}]}}"#,
        )
        .unwrap();
        match cmd {
            RealtimeCommand::Subscribe { topics } => assert_eq!(topics, vec![Topic::Admin]),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn favorite_update_is_scoped_to_its_user() {
        let user_id = Uuid::new_v4();
        let event = RealtimeEvent::FavoriteUpdate {
            user_id,
            property_id: Uuid::new_v4(),
            favorited: true,
        };
        assert_eq!(event.topics(), vec![Topic::User { user_id }]);
        assert!(RealtimeEvent::Ready { user_id }.topics().is_empty());
    }
}
