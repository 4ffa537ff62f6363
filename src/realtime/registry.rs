// Live-connection bookkeeping: which connections exist, who they are, which
// room each one occupies. Owned by AppState, created at startup, nothing
// survives a restart.
//
// The registry is shared across the multi-threaded runtime, so all state
// sits behind one mutex. The lock is never held across an await; fan-out
// only pushes into per-connection unbounded senders, which cannot block.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use super::events::ServerEvent;

pub type ConnId = Uuid;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoomMember {
    pub uid: String,
    pub email: String,
    pub username: String,
}

struct ConnectionEntry {
    tx: UnboundedSender<ServerEvent>,
    room: Option<String>,
    member: Option<RoomMember>,
}

#[derive(Default)]
struct Inner {
    connections: HashMap<ConnId, ConnectionEntry>,
    rooms: HashMap<String, HashSet<ConnId>>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum JoinOutcome {
    Joined,
    /// The same uid is already joined somewhere: silently ignored.
    AlreadyJoined,
    /// This connection is in a room already; it must leave first.
    Occupied,
    UnknownConnection,
}

#[derive(Default)]
pub struct Registry {
    inner: Mutex<Inner>,
}

impl Registry {
    pub fn new() -> Registry {
        Registry::default()
    }

    pub fn register(&self, conn: ConnId, tx: UnboundedSender<ServerEvent>) {
        self.inner.lock().connections.insert(
            conn,
            ConnectionEntry {
                tx,
                room: None,
                member: None,
            },
        );
    }

    /// Drops the connection, leaving its room first. Returns the room left,
    /// if any.
    pub fn unregister(&self, conn: ConnId) -> Option<String> {
        let mut inner = self.inner.lock();
        let entry = inner.connections.remove(&conn)?;
        let room = entry.room?;
        remove_from_room(&mut inner, &room, conn);
        Some(room)
    }

    pub fn join(&self, conn: ConnId, room: &str, member: RoomMember) -> JoinOutcome {
        let mut inner = self.inner.lock();

        let uid_joined = inner.connections.values().any(|entry| {
            entry.room.is_some()
                && entry.member.as_ref().is_some_and(|it| it.uid == member.uid)
        });
        if uid_joined {
            return JoinOutcome::AlreadyJoined;
        }

        let Some(entry) = inner.connections.get_mut(&conn) else {
            return JoinOutcome::UnknownConnection;
        };
        if entry.room.is_some() {
            return JoinOutcome::Occupied;
        }

        entry.room = Some(room.to_owned());
        entry.member = Some(member);
        inner.rooms.entry(room.to_owned()).or_default().insert(conn);
        JoinOutcome::Joined
    }

    /// Leaves whatever room the connection occupies. Identity stays attached
    /// so the user may join again. Returns the room left, if any.
    pub fn leave(&self, conn: ConnId) -> Option<String> {
        let mut inner = self.inner.lock();
        let room = inner.connections.get_mut(&conn)?.room.take()?;
        remove_from_room(&mut inner, &room, conn);
        Some(room)
    }

    /// Snapshot of a room's occupants; unknown rooms are just empty.
    pub fn members(&self, room: &str) -> Vec<RoomMember> {
        let inner = self.inner.lock();
        let Some(conns) = inner.rooms.get(room) else {
            return Vec::new();
        };
        conns
            .iter()
            .filter_map(|conn| inner.connections.get(conn))
            .filter_map(|entry| entry.member.clone())
            .collect()
    }

    /// Queues the event for every connection in the room, the sender's own
    /// included. Returns how many connections were reached.
    pub fn broadcast(&self, room: &str, event: &ServerEvent) -> usize {
        let inner = self.inner.lock();
        let Some(conns) = inner.rooms.get(room) else {
            return 0;
        };
        let mut reached = 0;
        for conn in conns {
            if let Some(entry) = inner.connections.get(conn) {
                if entry.tx.send(event.clone()).is_ok() {
                    reached += 1;
                }
            }
        }
        reached
    }

    pub fn send_to(&self, conn: ConnId, event: ServerEvent) {
        let inner = self.inner.lock();
        if let Some(entry) = inner.connections.get(&conn) {
            let _ = entry.tx.send(event);
        }
    }
}

fn remove_from_room(inner: &mut Inner, room: &str, conn: ConnId) {
    if let Some(members) = inner.rooms.get_mut(room) {
        members.remove(&conn);
        if members.is_empty() {
            inner.rooms.remove(room);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

    fn member(uid: &str) -> RoomMember {
        RoomMember {
            uid: uid.to_owned(),
            email: format!("{uid}@wave.net"),
            username: uid.to_owned(),
        }
    }

    fn connect(registry: &Registry) -> (ConnId, UnboundedReceiver<ServerEvent>) {
        let conn = Uuid::now_v7();
        let (tx, rx) = unbounded_channel();
        registry.register(conn, tx);
        (conn, rx)
    }

    #[test]
    fn join_and_leave_track_membership() {
        let registry = Registry::new();
        let (c1, _rx1) = connect(&registry);
        let (c2, _rx2) = connect(&registry);

        assert_eq!(registry.join(c1, "R", member("u1")), JoinOutcome::Joined);
        assert_eq!(registry.join(c2, "R", member("u2")), JoinOutcome::Joined);

        let mut uids: Vec<_> = registry.members("R").into_iter().map(|m| m.uid).collect();
        uids.sort();
        assert_eq!(uids, ["u1", "u2"]);

        assert_eq!(registry.leave(c1), Some("R".to_owned()));
        let uids: Vec<_> = registry.members("R").into_iter().map(|m| m.uid).collect();
        assert_eq!(uids, ["u2"]);

        assert_eq!(registry.leave(c2), Some("R".to_owned()));
        assert!(registry.members("R").is_empty());
        // the room entry itself is gone once the last member leaves
        assert!(!registry.inner.lock().rooms.contains_key("R"));
    }

    #[test]
    fn unknown_room_is_empty_not_an_error() {
        let registry = Registry::new();
        assert!(registry.members("nowhere").is_empty());
        assert_eq!(registry.broadcast("nowhere", &ServerEvent::Error { error: "x".to_owned() }), 0);
    }

    #[test]
    fn same_uid_cannot_join_twice() {
        let registry = Registry::new();
        let (c1, _rx1) = connect(&registry);
        let (c2, _rx2) = connect(&registry);

        assert_eq!(registry.join(c1, "R", member("u1")), JoinOutcome::Joined);
        assert_eq!(registry.join(c2, "S", member("u1")), JoinOutcome::AlreadyJoined);
        assert!(registry.members("S").is_empty());
    }

    #[test]
    fn connection_occupies_one_room_at_a_time() {
        let registry = Registry::new();
        let (c1, _rx1) = connect(&registry);

        assert_eq!(registry.join(c1, "R", member("u1")), JoinOutcome::Joined);
        assert_eq!(registry.join(c1, "S", member("u1")), JoinOutcome::Occupied);

        registry.leave(c1);
        assert_eq!(registry.join(c1, "S", member("u1")), JoinOutcome::Joined);
    }

    #[test]
    fn join_requires_registration() {
        let registry = Registry::new();
        assert_eq!(
            registry.join(Uuid::now_v7(), "R", member("u1")),
            JoinOutcome::UnknownConnection
        );
    }

    #[test]
    fn unregister_implies_leave() {
        let registry = Registry::new();
        let (c1, _rx1) = connect(&registry);
        let (c2, _rx2) = connect(&registry);

        registry.join(c1, "R", member("u1"));
        registry.join(c2, "R", member("u2"));

        assert_eq!(registry.unregister(c1), Some("R".to_owned()));
        let uids: Vec<_> = registry.members("R").into_iter().map(|m| m.uid).collect();
        assert_eq!(uids, ["u2"]);
    }

    #[test]
    fn broadcast_reaches_room_members_only() {
        let registry = Registry::new();
        let (c1, mut rx1) = connect(&registry);
        let (c2, mut rx2) = connect(&registry);
        let (c3, mut rx3) = connect(&registry);

        registry.join(c1, "R", member("u1"));
        registry.join(c2, "R", member("u2"));
        registry.join(c3, "S", member("u3"));

        let event = ServerEvent::Error { error: "ping".to_owned() };
        assert_eq!(registry.broadcast("R", &event), 2);

        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
        assert!(rx3.try_recv().is_err());
    }

    #[test]
    fn events_arrive_in_broadcast_order() {
        let registry = Registry::new();
        let (c1, mut rx1) = connect(&registry);
        registry.join(c1, "R", member("u1"));

        registry.broadcast("R", &ServerEvent::Error { error: "first".to_owned() });
        registry.broadcast("R", &ServerEvent::Error { error: "second".to_owned() });

        let ServerEvent::Error { error } = rx1.try_recv().unwrap() else {
            panic!("expected error event");
        };
        assert_eq!(error, "first");
        let ServerEvent::Error { error } = rx1.try_recv().unwrap() else {
            panic!("expected error event");
        };
        assert_eq!(error, "second");
    }
}
