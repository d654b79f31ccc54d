use crate::registry::{Registry, Snapshot};

impl Snapshot {
    /// True only when exactly one user entry carries this username and credential
    #[inline]
    pub fn authenticate(&self, username: &str, password: &str) -> bool {
        self.users().iter().filter(|u| u.username == username && u.credential == password).take(2).count() == 1
    }
}

impl Registry {
    #[inline]
    pub fn authenticate(&self, username: &str, password: &str) -> bool {
        self.load().authenticate(username, password)
    }
}

#[cfg(test)]
mod tests {
    use crate::registry::tests::{boiler_snapshot, topics};
    use crate::registry::{Snapshot, User};

    #[test]
    fn test_authenticate() {
        let s = boiler_snapshot();
        assert!(s.authenticate("alice", "secret"));
        assert!(!s.authenticate("alice", "wrong"));
        assert!(!s.authenticate("bob", "secret"));
        assert!(!s.authenticate("", ""));
    }

    #[test]
    fn test_duplicated_user_fails_closed() {
        let s = Snapshot::new(
            vec![],
            vec![User::new("alice", "secret"), User::new("alice", "secret")],
            topics(&[]),
        )
        .unwrap();
        assert!(!s.authenticate("alice", "secret"));

        let s = Snapshot::new(
            vec![],
            vec![User::new("alice", "secret"), User::new("alice", "other")],
            topics(&[]),
        )
        .unwrap();
        assert!(s.authenticate("alice", "secret"));
        assert!(s.authenticate("alice", "other"));
    }
}
