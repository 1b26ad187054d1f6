use std::{any::Any, marker::PhantomData, rc::Rc};

use derive_ex::derive_ex;

use crate::{effect, SignalContext, StateRef, Subscription};

mod builder;

pub use builder::SignalBuilder;


/// A node of the dependency graph that can be read through a [`Signal`].
pub trait SignalNode: 'static {
    type Value: ?Sized + 'static;

    /// Returns the current value and records a dependency on this node in `sc`.
    ///
    /// `rc_self` is `self` as `Rc<dyn Any>` so that the node can register itself as a source.
    fn borrow<'a>(
        &'a self,
        rc_self: Rc<dyn Any>,
        sc: &mut SignalContext,
    ) -> StateRef<'a, Self::Value>;
}

#[derive_ex(Clone, bound())]
enum RawSignal<T: ?Sized + 'static> {
    StaticRef(&'static T),
    Node {
        node: Rc<dyn SignalNode<Value = T>>,
        any: Rc<dyn Any>,
    },
}

/// Read-only handle to a reactive value.
///
/// A `Signal` is either a view of a [`State`](crate::State), a constant, or a derived value
/// whose computation is cached until one of the values it read changes.
#[derive_ex(Clone, bound())]
pub struct Signal<T: ?Sized + 'static>(RawSignal<T>);

impl<T: ?Sized + 'static> Signal<T> {
    /// Creates a derived signal that caches the result of `f`.
    ///
    /// `f` is not called until the signal is read.
    pub fn new(f: impl FnMut(&mut SignalContext) -> T + 'static) -> Self
    where
        T: Sized,
    {
        SignalBuilder::new(f).build()
    }

    /// Creates a derived signal whose dependents are not notified when `f` returns an equal value.
    pub fn new_dedup(f: impl FnMut(&mut SignalContext) -> T + 'static) -> Self
    where
        T: Sized + PartialEq,
    {
        SignalBuilder::new(f).dedup().build()
    }

    pub fn from_value(value: T) -> Self
    where
        T: Sized,
    {
        Self::from_node(Rc::new(ConstantNode(value)))
    }
    pub fn from_static_ref(value: &'static T) -> Self {
        Signal(RawSignal::StaticRef(value))
    }
    pub fn from_node(node: Rc<impl SignalNode<Value = T>>) -> Self {
        let any: Rc<dyn Any> = node.clone();
        Signal(RawSignal::Node { node, any })
    }

    pub fn borrow<'a>(&'a self, sc: &mut SignalContext) -> StateRef<'a, T> {
        match &self.0 {
            RawSignal::StaticRef(value) => StateRef::from(*value),
            RawSignal::Node { node, any } => SignalNode::borrow(&**node, any.clone(), sc),
        }
    }
    pub fn get(&self, sc: &mut SignalContext) -> <T as ToOwned>::Owned
    where
        T: ToOwned,
    {
        self.borrow(sc).into_owned()
    }
    pub fn with<U>(&self, sc: &mut SignalContext, f: impl FnOnce(&T) -> U) -> U {
        f(&self.borrow(sc))
    }

    /// Projects the value through `f` without caching.
    pub fn map<U: ?Sized + 'static>(&self, f: impl Fn(&T) -> &U + 'static) -> Signal<U> {
        Signal::from_node(Rc::new(MapNode {
            source: self.clone(),
            f,
            _value: PhantomData,
        }))
    }

    /// Calls `f` with the value now and each time it changes.
    ///
    /// See [`effect`] for when `f` is called.
    pub fn subscribe(&self, mut f: impl FnMut(&T) + 'static) -> Subscription {
        let this = self.clone();
        effect(move |sc| f(&this.borrow(sc)))
    }
}
impl<T: ?Sized + 'static> From<&'static T> for Signal<T> {
    fn from(value: &'static T) -> Self {
        Self::from_static_ref(value)
    }
}

struct ConstantNode<T>(T);

impl<T: 'static> SignalNode for ConstantNode<T> {
    type Value = T;
    fn borrow<'a>(&'a self, _rc_self: Rc<dyn Any>, _sc: &mut SignalContext) -> StateRef<'a, T> {
        StateRef::from(&self.0)
    }
}

struct MapNode<S: ?Sized + 'static, U: ?Sized, F> {
    source: Signal<S>,
    f: F,
    _value: PhantomData<Box<U>>,
}
impl<S, U, F> SignalNode for MapNode<S, U, F>
where
    S: ?Sized + 'static,
    U: ?Sized + 'static,
    F: Fn(&S) -> &U + 'static,
{
    type Value = U;
    fn borrow<'a>(&'a self, _rc_self: Rc<dyn Any>, sc: &mut SignalContext) -> StateRef<'a, U> {
        StateRef::map(self.source.borrow(sc), &self.f)
    }
}
