use std::time::{
  Duration,
  Instant
};

/// Default quiescence window for search input.
pub const DEFAULT_SEARCH_DEBOUNCE: Duration =
  Duration::from_millis(300);

#[derive(Debug, Clone)]
struct Pending<T> {
  due:   Instant,
  value: T
}

/// Cancellable single-slot timer. Scheduling replaces whatever was pending,
/// so at most one value waits at a time; nothing happens until `poll` sees
/// the deadline pass.
#[derive(Debug, Clone)]
pub struct Debouncer<T> {
  delay:   Duration,
  pending: Option<Pending<T>>
}

impl<T> Debouncer<T> {
  pub fn new(delay: Duration) -> Self {
    Self {
      delay,
      pending: None
    }
  }

  pub fn delay(&self) -> Duration {
    self.delay
  }

  pub fn schedule(
    &mut self,
    value: T,
    now: Instant
  ) {
    self.pending = Some(Pending {
      due: now + self.delay,
      value
    });
  }

  pub fn cancel_pending(
    &mut self
  ) -> Option<T> {
    self.pending.take().map(|p| p.value)
  }

  pub fn is_pending(&self) -> bool {
    self.pending.is_some()
  }

  /// Releases the pending value once its deadline has passed.
  pub fn poll(
    &mut self,
    now: Instant
  ) -> Option<T> {
    let ready = self
      .pending
      .as_ref()
      .is_some_and(|p| now >= p.due);
    if ready {
      self.cancel_pending()
    } else {
      None
    }
  }
}

impl<T> Default for Debouncer<T> {
  fn default() -> Self {
    Self::new(DEFAULT_SEARCH_DEBOUNCE)
  }
}

#[cfg(test)]
mod tests {
  use std::time::{
    Duration,
    Instant
  };

  use super::Debouncer;

  #[test]
  fn later_keystroke_replaces_pending_one()
  {
    let start = Instant::now();
    let mut debouncer = Debouncer::new(
      Duration::from_millis(300)
    );

    debouncer.schedule("m", start);
    debouncer.schedule(
      "mi",
      start + Duration::from_millis(200)
    );

    assert_eq!(
      debouncer.poll(
        start + Duration::from_millis(350)
      ),
      None
    );
    assert_eq!(
      debouncer.poll(
        start + Duration::from_millis(500)
      ),
      Some("mi")
    );
    assert!(!debouncer.is_pending());
    assert_eq!(
      debouncer.poll(
        start + Duration::from_millis(900)
      ),
      None
    );
  }

  #[test]
  fn cancel_discards_pending_value() {
    let start = Instant::now();
    let mut debouncer = Debouncer::default();
    debouncer.schedule(1, start);
    assert_eq!(
      debouncer.cancel_pending(),
      Some(1)
    );
    assert_eq!(
      debouncer
        .poll(start + Duration::from_secs(5)),
      None
    );
  }
}
