//! Room membership for one live-channel connection (spec §4.6): the
//! authenticated client's organization room plus whatever execution- or
//! playbook-list rooms it has explicitly subscribed to.

use std::collections::HashSet;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Room {
    Organization(i64),
    Execution(i64),
    Playbooks(i64),
}

#[derive(Debug, Error)]
pub enum RoomError {
    #[error("room {0} belongs to a different organization")]
    CrossOrganization(String),
    #[error("unrecognized room name: {0}")]
    Unrecognized(String),
}

impl Room {
    /// Parses a room name, rejecting `org:`/`playbooks:` rooms that don't
    /// belong to `organization_id`. `execution:<id>` rooms parse regardless —
    /// their organization is only known once the referenced execution is
    /// looked up, so that check happens one layer up in the connection
    /// handler.
    pub fn parse(name: &str, organization_id: i64) -> Result<Room, RoomError> {
        if let Some(rest) = name.strip_prefix("org:") {
            let id = parse_id(name, rest)?;
            if id != organization_id {
                return Err(RoomError::CrossOrganization(name.to_string()));
            }
            return Ok(Room::Organization(id));
        }
        if let Some(rest) = name.strip_prefix("execution:") {
            return Ok(Room::Execution(parse_id(name, rest)?));
        }
        if let Some(rest) = name.strip_prefix("playbooks:") {
            let id = parse_id(name, rest)?;
            if id != organization_id {
                return Err(RoomError::CrossOrganization(name.to_string()));
            }
            return Ok(Room::Playbooks(id));
        }
        Err(RoomError::Unrecognized(name.to_string()))
    }

    pub fn name(&self) -> String {
        match self {
            Room::Organization(id) => format!("org:{id}"),
            Room::Execution(id) => format!("execution:{id}"),
            Room::Playbooks(id) => format!("playbooks:{id}"),
        }
    }
}

fn parse_id(full_name: &str, segment: &str) -> Result<i64, RoomError> {
    segment.parse().map_err(|_| RoomError::Unrecognized(full_name.to_string()))
}

/// Tracks which rooms one connection belongs to. The organization room is
/// implicit from the handshake; everything else is joined explicitly.
pub struct Membership {
    organization_id: i64,
    rooms: HashSet<Room>,
}

impl Membership {
    pub fn new(organization_id: i64) -> Self {
        let mut rooms = HashSet::new();
        rooms.insert(Room::Organization(organization_id));
        Self { organization_id, rooms }
    }

    pub fn organization_id(&self) -> i64 {
        self.organization_id
    }

    pub fn join(&mut self, room: Room) {
        self.rooms.insert(room);
    }

    pub fn leave(&mut self, room: &Room) -> bool {
        self.rooms.remove(room)
    }

    pub fn is_member(&self, room: &Room) -> bool {
        self.rooms.contains(room)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_room_kinds() {
        assert_eq!(Room::parse("org:7", 7).unwrap(), Room::Organization(7));
        assert_eq!(Room::parse("execution:99", 7).unwrap(), Room::Execution(99));
        assert_eq!(Room::parse("playbooks:7", 7).unwrap(), Room::Playbooks(7));
    }

    #[test]
    fn rejects_cross_organization_rooms() {
        assert!(matches!(Room::parse("org:8", 7), Err(RoomError::CrossOrganization(_))));
        assert!(matches!(Room::parse("playbooks:8", 7), Err(RoomError::CrossOrganization(_))));
    }

    #[test]
    fn rejects_unrecognized_room_names() {
        assert!(matches!(Room::parse("widgets:1", 7), Err(RoomError::Unrecognized(_))));
    }

    #[test]
    fn membership_tracks_joins_and_leaves() {
        let mut membership = Membership::new(7);
        assert!(membership.is_member(&Room::Organization(7)));

        membership.join(Room::Execution(1));
        assert!(membership.is_member(&Room::Execution(1)));

        assert!(membership.leave(&Room::Execution(1)));
        assert!(!membership.is_member(&Room::Execution(1)));
    }
}
