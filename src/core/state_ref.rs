use std::{cell::Ref, fmt::Debug, ops::Deref};

/// Abstracted reference.
///
/// Internally it has one of the following values and then you can get `&T`.
///
/// | Type       | Created by         |
/// | ---------- | ------------------ |
/// | `&T`       | [`From<&T>`]       |
/// | `Ref<T>`   | [`From<Ref<T>>`]   |
pub struct StateRef<'a, T: ?Sized + 'a>(RawRef<'a, T>);

enum RawRef<'a, T: ?Sized + 'a> {
    Ref(&'a T),
    Cell(Ref<'a, T>),
}

impl<'a, T: ?Sized> StateRef<'a, T> {
    /// Maps a `StateRef<T>` to a `StateRef<U>` using a function that returns a reference `&U`.
    pub fn map<U: ?Sized>(this: Self, f: impl FnOnce(&T) -> &U) -> StateRef<'a, U> {
        StateRef(match this.0 {
            RawRef::Ref(value) => RawRef::Ref(f(value)),
            RawRef::Cell(value) => RawRef::Cell(Ref::map(value, f)),
        })
    }

    pub fn into_owned(self) -> <T as ToOwned>::Owned
    where
        T: ToOwned,
    {
        (*self).to_owned()
    }
}

impl<T: ?Sized> Deref for StateRef<'_, T> {
    type Target = T;
    fn deref(&self) -> &Self::Target {
        match &self.0 {
            RawRef::Ref(value) => value,
            RawRef::Cell(value) => &**value,
        }
    }
}
impl<'a, T: ?Sized> From<&'a T> for StateRef<'a, T> {
    fn from(value: &'a T) -> Self {
        Self(RawRef::Ref(value))
    }
}
impl<'a, T: ?Sized> From<Ref<'a, T>> for StateRef<'a, T> {
    fn from(value: Ref<'a, T>) -> Self {
        Self(RawRef::Cell(value))
    }
}
impl<T: ?Sized + Debug> Debug for StateRef<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        (**self).fmt(f)
    }
}
