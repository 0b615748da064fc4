use itertools::Either;

/// Ordering by the natural key.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum Order {
    #[default]
    Ascending,
    Descending,
}

/// Predicate-filtered, sorted, paged selection.
#[must_use]
pub struct Query<R> {
    filter: Box<dyn Fn(&R) -> bool + Send + Sync>,
    order: Order,
    limit: Option<usize>,
    offset: usize,
}

impl<R> Query<R> {
    pub fn all() -> Self {
        Self::filter(|_| true)
    }

    pub fn filter(filter: impl Fn(&R) -> bool + Send + Sync + 'static) -> Self {
        Self { filter: Box::new(filter), order: Order::Ascending, limit: None, offset: 0 }
    }

    pub fn order(mut self, order: Order) -> Self {
        self.order = order;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Apply to rows that are already sorted in ascending key order.
    pub(super) fn apply<'a>(&self, rows: impl DoubleEndedIterator<Item = &'a R>) -> Vec<R>
    where
        R: Clone + 'a,
    {
        let matching = rows.filter(|record| (self.filter)(record));
        let ordered = match self.order {
            Order::Ascending => Either::Left(matching),
            Order::Descending => Either::Right(matching.rev()),
        };
        ordered.skip(self.offset).take(self.limit.unwrap_or(usize::MAX)).cloned().collect()
    }
}
