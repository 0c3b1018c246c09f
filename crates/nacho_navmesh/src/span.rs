use slotmap::SlotMap;

slotmap::new_key_type! {
    /// A key for a span in [`Spans`](crate::span::Spans).
    pub struct SpanKey;
}

/// The arena holding every [`Span`] of a [`Heightfield`](crate::Heightfield).
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Spans(SlotMap<SpanKey, Span>);

impl Spans {
    const DEFAULT_CAPACITY: usize = 1024;

    pub(crate) fn with_min_capacity(min_capacity: usize) -> Self {
        let capacity = min_capacity.max(Self::DEFAULT_CAPACITY);
        Self(SlotMap::with_capacity_and_key(capacity))
    }

    pub(crate) fn insert(&mut self, span: Span) -> SpanKey {
        self.0.insert(span)
    }

    pub(crate) fn remove(&mut self, key: SpanKey) -> Option<Span> {
        self.0.remove(key)
    }

    /// Iterates over all spans in no particular order.
    pub fn values(&self) -> impl Iterator<Item = &Span> {
        self.0.values()
    }

    /// The number of allocated spans.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no span is allocated.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::ops::Index<SpanKey> for Spans {
    type Output = Span;

    fn index(&self, key: SpanKey) -> &Self::Output {
        &self.0[key]
    }
}

impl std::ops::IndexMut<SpanKey> for Spans {
    fn index_mut(&mut self, key: SpanKey) -> &mut Self::Output {
        &mut self.0[key]
    }
}

pub(crate) struct SpanBuilder {
    pub(crate) min: u16,
    pub(crate) max: u16,
    pub(crate) walkable: bool,
    pub(crate) next: Option<SpanKey>,
}

impl SpanBuilder {
    pub(crate) fn build(self) -> Span {
        Span {
            min: self.min,
            max: self.max,
            walkable: self.walkable,
            next: self.next,
        }
    }
}

impl From<SpanBuilder> for Span {
    fn from(builder: SpanBuilder) -> Self {
        builder.build()
    }
}

/// A solid interval in a [`Heightfield`](crate::Heightfield) column.
/// Build with [`SpanBuilder`]
#[derive(Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Span {
    /// Height of the floor in slab units.
    min: u16,
    /// Height of the ceiling in slab units.
    max: u16,
    /// Whether the top of the span can be stood on.
    walkable: bool,
    /// The key of the next-higher span in the column
    next: Option<SpanKey>,
}

impl Span {
    /// The lowest slab covered by the span.
    #[inline]
    pub fn min(&self) -> u16 {
        self.min
    }

    #[inline]
    pub(crate) fn set_min(&mut self, min: u16) {
        self.min = min;
    }

    /// The slab boundary at the top of the span.
    #[inline]
    pub fn max(&self) -> u16 {
        self.max
    }

    #[inline]
    pub(crate) fn set_max(&mut self, max: u16) {
        self.max = max;
    }

    /// Whether the top surface of the span is walkable.
    #[inline]
    pub fn walkable(&self) -> bool {
        self.walkable
    }

    #[inline]
    pub(crate) fn set_walkable(&mut self, walkable: bool) {
        self.walkable = walkable;
    }

    /// The key of the next-higher span in the column.
    #[inline]
    pub fn next(&self) -> Option<SpanKey> {
        self.next
    }

    #[inline]
    pub(crate) fn set_next(&mut self, next: impl Into<Option<SpanKey>>) {
        self.next = next.into();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span() -> Span {
        SpanBuilder {
            min: 2,
            max: 10,
            walkable: true,
            next: None,
        }
        .build()
    }

    #[test]
    fn can_retrieve_span_data_after_building() {
        let span = span();
        assert_eq!(span.min(), 2);
        assert_eq!(span.max(), 10);
        assert!(span.walkable());
        assert_eq!(span.next(), None);
    }

    #[test]
    fn can_retrieve_span_data_after_setting() {
        let mut span = span();
        let mut spans = Spans::with_min_capacity(0);
        let span_key = spans.insert(span.clone());

        span.set_min(1);
        span.set_max(4);
        span.set_walkable(false);
        span.set_next(span_key);

        assert_eq!(span.min(), 1);
        assert_eq!(span.max(), 4);
        assert!(!span.walkable());
        assert_eq!(span.next(), Some(span_key));
        assert_eq!(spans.len(), 1);
    }
}
