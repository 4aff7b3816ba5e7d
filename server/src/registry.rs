use std::collections::HashMap;
use std::num::Wrapping;

use system::Session;

/// Server-side key of one live connection. Never leaves the process, so
/// two connections claiming the same session id stay distinguishable.
pub type ConnectionId = u64;

#[derive(Debug, PartialEq)]
pub enum RegistryError {
    AlreadyRegistered,
}

/// Sessions of one room, keyed by connection. Owned by the room's event
/// loop; iteration follows registration order.
pub struct SessionRegistry {
    connection_id_source: Wrapping<ConnectionId>,
    order: Vec<ConnectionId>,
    sessions: HashMap<ConnectionId, Session>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            connection_id_source: Wrapping(0),
            order: Vec::new(),
            sessions: HashMap::new(),
        }
    }

    pub fn new_connection_id(&mut self) -> ConnectionId {
        self.connection_id_source += Wrapping(1);
        self.connection_id_source.0
    }

    pub fn create(
        &mut self,
        connection_id: ConnectionId,
        session: Session,
    ) -> Result<(), RegistryError> {
        if self.sessions.contains_key(&connection_id) {
            return Err(RegistryError::AlreadyRegistered);
        }
        self.order.push(connection_id);
        self.sessions.insert(connection_id, session);
        Ok(())
    }

    pub fn get(&self, connection_id: &ConnectionId) -> Option<&Session> {
        self.sessions.get(connection_id)
    }

    pub fn get_mut(&mut self, connection_id: &ConnectionId) -> Option<&mut Session> {
        self.sessions.get_mut(connection_id)
    }

    /// Removes and returns the session, or `None` when it was already
    /// gone. Callers key their "exactly once" cleanup off that `None`.
    pub fn remove(&mut self, connection_id: &ConnectionId) -> Option<Session> {
        let removed = self.sessions.remove(connection_id);
        if removed.is_some() {
            self.order.retain(|id| id != connection_id);
        }
        removed
    }

    pub fn sessions(&self) -> impl Iterator<Item = &Session> + '_ {
        self.sessions_with_ids().map(|(_, session)| session)
    }

    pub fn sessions_with_ids(&self) -> impl Iterator<Item = (ConnectionId, &Session)> + '_ {
        self.order
            .iter()
            .filter_map(move |id| self.sessions.get(id).map(|session| (*id, session)))
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_hands_out_distinct_connection_ids() {
        let mut registry = SessionRegistry::new();
        let a = registry.new_connection_id();
        let b = registry.new_connection_id();
        assert_ne!(a, b);
    }

    #[test]
    fn it_rejects_double_registration() {
        let mut registry = SessionRegistry::new();
        let id = registry.new_connection_id();
        registry
            .create(id, Session::new("u1".into()))
            .expect("first registration");
        assert_eq!(
            registry.create(id, Session::new("u1".into())),
            Err(RegistryError::AlreadyRegistered)
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn it_iterates_in_registration_order() {
        let mut registry = SessionRegistry::new();
        for name in &["u1", "u2", "u3"] {
            let id = registry.new_connection_id();
            registry
                .create(id, Session::new((*name).into()))
                .expect("registration");
        }
        let ids: Vec<&str> = registry.sessions().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["u1", "u2", "u3"]);
    }

    #[test]
    fn it_removes_exactly_once() {
        let mut registry = SessionRegistry::new();
        let id = registry.new_connection_id();
        registry
            .create(id, Session::new("u1".into()))
            .expect("registration");
        assert!(registry.remove(&id).is_some());
        assert!(registry.remove(&id).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn it_keeps_order_across_removals() {
        let mut registry = SessionRegistry::new();
        let mut ids = Vec::new();
        for name in &["u1", "u2", "u3"] {
            let id = registry.new_connection_id();
            registry
                .create(id, Session::new((*name).into()))
                .expect("registration");
            ids.push(id);
        }
        registry.remove(&ids[1]);
        let names: Vec<&str> = registry.sessions().map(|s| s.id.as_str()).collect();
        assert_eq!(names, vec!["u1", "u3"]);
    }
}
