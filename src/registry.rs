use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use log::debug;
use rand::distributions::Alphanumeric;
use rand::Rng;

const TICKET_LEN: usize = 16;

/// Opaque key identifying one in-flight job.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ticket(String);

impl Ticket {
    /// Draws a random alphanumeric ticket.
    ///
    /// Uniqueness is only probabilistic; [`Registry::admit`] re-draws on collision.
    pub fn random() -> Self {
        let s = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(TICKET_LEN)
            .map(char::from)
            .collect();
        Ticket(s)
    }

    /// Returns the ticket as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Ticket {
    fn from(s: String) -> Self {
        Ticket(s)
    }
}

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Concurrent map of in-flight jobs: ticket -> input being processed.
///
/// Cloning is cheap and every clone observes the same jobs.
pub struct Registry<I> {
    jobs: Arc<Mutex<HashMap<Ticket, I>>>,
    /// Highest number of entries ever held at once.
    peak: Arc<AtomicUsize>,
}

impl<I> Clone for Registry<I> {
    fn clone(&self) -> Self {
        Registry {
            jobs: self.jobs.clone(),
            peak: self.peak.clone(),
        }
    }
}

impl<I> Default for Registry<I> {
    fn default() -> Self {
        Registry {
            jobs: Arc::new(Mutex::new(HashMap::new())),
            peak: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl<I> Registry<I> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `input` as in flight under a fresh ticket and returns the ticket.
    ///
    /// `next_ticket` is called again until it yields a key that is not taken.
    pub fn admit<F>(&self, input: I, mut next_ticket: F) -> Ticket
    where
        F: FnMut() -> Ticket,
    {
        let mut jobs = self.jobs.lock().unwrap();
        loop {
            match jobs.entry(next_ticket()) {
                Entry::Vacant(e) => {
                    let ticket = e.key().clone();
                    e.insert(input);
                    self.peak.fetch_max(jobs.len(), Ordering::SeqCst);
                    return ticket;
                }
                Entry::Occupied(e) => {
                    debug!("Ticket {} already in flight, drawing another", e.key());
                }
            }
        }
    }

    /// Like [`admit`](Registry::admit), but the job is removed again when the
    /// returned guard is dropped, including during unwinding.
    pub fn track<F>(&self, input: I, next_ticket: F) -> InFlight<'_, I>
    where
        F: FnMut() -> Ticket,
    {
        let ticket = self.admit(input, next_ticket);
        InFlight {
            jobs: self,
            ticket,
        }
    }

    /// Removes a finished job, returning its input.
    pub fn remove(&self, ticket: &Ticket) -> Option<I> {
        self.jobs.lock().unwrap().remove(ticket)
    }

    /// Returns whether `ticket` is currently in flight.
    pub fn contains(&self, ticket: &Ticket) -> bool {
        self.jobs.lock().unwrap().contains_key(ticket)
    }

    /// Number of jobs currently in flight.
    pub fn len(&self) -> usize {
        self.jobs.lock().unwrap().len()
    }

    /// Returns `true` if no job is in flight.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Highest number of jobs that were ever in flight at the same time.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// A registered job. Dropping it removes the entry.
pub struct InFlight<'a, I> {
    jobs: &'a Registry<I>,
    ticket: Ticket,
}

impl<I> InFlight<'_, I> {
    /// The ticket the job is registered under.
    pub fn ticket(&self) -> &Ticket {
        &self.ticket
    }
}

impl<I> Drop for InFlight<'_, I> {
    fn drop(&mut self) {
        self.jobs.remove(&self.ticket);
    }
}

impl<I: Clone> Registry<I> {
    /// Copies out the jobs in flight right now.
    pub fn snapshot(&self) -> Vec<(Ticket, I)> {
        self.jobs
            .lock()
            .unwrap()
            .iter()
            .map(|(t, i)| (t.clone(), i.clone()))
            .collect()
    }
}
