use std::{any::Any, mem::take, rc::Rc};

/// Keeps an effect (or any other registration) alive.
///
/// Dropping the `Subscription` cancels it.
#[derive(Default)]
#[must_use]
pub struct Subscription(RawSubscription);

impl Subscription {
    pub fn empty() -> Self {
        Subscription(RawSubscription::Empty)
    }
    pub fn from_fn(f: impl FnOnce() + 'static) -> Self {
        Subscription(RawSubscription::Fn(Box::new(f)))
    }
    pub fn from_rc(rc: Rc<dyn Any>) -> Self {
        Subscription(RawSubscription::Rc(rc))
    }
    pub fn is_empty(&self) -> bool {
        matches!(self.0, RawSubscription::Empty)
    }
}
impl Drop for Subscription {
    fn drop(&mut self) {
        match take(&mut self.0) {
            RawSubscription::Empty | RawSubscription::Rc(_) => {}
            RawSubscription::Fn(f) => f(),
            RawSubscription::Many(subscriptions) => drop(subscriptions),
        }
    }
}
impl FromIterator<Subscription> for Subscription {
    fn from_iter<I: IntoIterator<Item = Subscription>>(iter: I) -> Self {
        Subscription(RawSubscription::Many(iter.into_iter().collect()))
    }
}

#[derive(Default)]
enum RawSubscription {
    #[default]
    Empty,
    Fn(Box<dyn FnOnce() + 'static>),
    Rc(#[allow(unused)] Rc<dyn Any>),
    Many(Vec<Subscription>),
}
