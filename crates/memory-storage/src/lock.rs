use std::sync::Mutex;

/// A mutex that is only ever held for the duration of a closure, so it can
/// never be held across an await point.
pub struct Lock<T> {
    data: Mutex<T>,
}

impl<T> Lock<T> {
    pub fn new(data: T) -> Self {
        Lock {
            data: Mutex::new(data),
        }
    }

    pub fn apply<U>(&self, f: impl FnOnce(&mut T) -> U) -> U {
        f(&mut self.data.lock().expect("lock poisoned"))
    }
}
