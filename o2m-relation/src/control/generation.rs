use std::marker::PhantomData;

/// Hands out [`Ticket`]s for one kind of fetch, and remembers the newest.
///
/// A fetch takes a ticket when it is triggered and may only store its result
/// if its ticket is still the newest when it completes. This orders results
/// by trigger time rather than completion time.
///
/// The type parameter T ties tickets to the fetch they were issued for. This
/// is a compile-time check only.
pub struct Generation<T> {
    counter: u64,
    phantom: PhantomData<T>,
}

impl<T> Generation<T> {
    pub fn new() -> Self {
        Generation {
            counter: 0,
            phantom: PhantomData,
        }
    }

    pub fn next(&mut self) -> Ticket<T> {
        self.counter += 1;
        Ticket {
            num: self.counter,
            phantom: PhantomData,
        }
    }

    /// Invalidate all outstanding tickets.
    pub fn supersede(&mut self) {
        self.counter += 1;
    }

    pub fn is_latest(&self, ticket: &Ticket<T>) -> bool {
        ticket.num == self.counter
    }
}

impl<T> Default for Generation<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct Ticket<T> {
    num: u64,
    phantom: PhantomData<T>,
}

impl<T> Ticket<T> {
    pub fn num(&self) -> u64 {
        self.num
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fetch;

    #[test]
    fn test_newest_ticket_wins() {
        let mut generation: Generation<Fetch> = Generation::new();
        let first = generation.next();
        let second = generation.next();
        assert!(!generation.is_latest(&first));
        assert!(generation.is_latest(&second));
        assert_eq!(first.num() + 1, second.num());
    }

    #[test]
    fn test_supersede() {
        let mut generation: Generation<Fetch> = Generation::new();
        let ticket = generation.next();
        generation.supersede();
        assert!(!generation.is_latest(&ticket));
    }
}
