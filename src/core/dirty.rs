use std::ops::BitOrAssign;

/// How stale a node is. Ordered from freshest to stalest.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Default)]
pub enum Dirty {
    #[default]
    Clean,
    /// Some transitive source changed; the direct sources must be checked.
    MaybeDirty,
    Dirty,
}

impl Dirty {
    pub fn from_is_dirty(is_dirty: bool) -> Self {
        match is_dirty {
            true => Self::Dirty,
            false => Self::Clean,
        }
    }
    pub fn is_clean(self) -> bool {
        matches!(self, Self::Clean)
    }
    pub fn is_maybe_dirty(self) -> bool {
        matches!(self, Self::MaybeDirty)
    }
    pub fn is_dirty(self) -> bool {
        matches!(self, Self::Dirty)
    }

    /// Whether a node at this level still has to forward a new notification.
    ///
    /// Only a clean node forwards. A stale node already told its dependents.
    pub fn needs_notify(self) -> bool {
        self.is_clean()
    }
}

/// Keeps the stalest of the two levels.
impl<T: Into<Dirty>> BitOrAssign<T> for Dirty {
    fn bitor_assign(&mut self, rhs: T) {
        *self = (*self).max(rhs.into());
    }
}

/// Level carried by a notification. A notification never makes a node clean.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum DirtyOrMaybeDirty {
    Dirty,
    MaybeDirty,
}

impl DirtyOrMaybeDirty {
    /// `MaybeDirty` if `filter` is set, since a filtering node may turn out unchanged.
    pub fn with_filter(self, filter: bool) -> Self {
        if filter {
            Self::MaybeDirty
        } else {
            self
        }
    }
}

impl From<DirtyOrMaybeDirty> for Dirty {
    fn from(level: DirtyOrMaybeDirty) -> Self {
        match level {
            DirtyOrMaybeDirty::MaybeDirty => Self::MaybeDirty,
            DirtyOrMaybeDirty::Dirty => Self::Dirty,
        }
    }
}
