use parking_lot::RwLock;
use shared::domain::User;

/// Signed-in user, owned by whatever storage the host application uses.
pub trait UserSession: Send + Sync {
    fn current_user(&self) -> Option<User>;
    fn set_current_user(&self, user: User);
    fn clear(&self);
}

#[derive(Default)]
pub struct InMemoryUserSession {
    user: RwLock<Option<User>>,
}

impl InMemoryUserSession {
    pub fn new() -> Self {
        Self::default()
    }
}

impl UserSession for InMemoryUserSession {
    fn current_user(&self) -> Option<User> {
        self.user.read().clone()
    }

    fn set_current_user(&self, user: User) {
        *self.user.write() = Some(user);
    }

    fn clear(&self) {
        self.user.write().take();
    }
}
