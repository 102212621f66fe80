// BALLAST GOVERNOR FLEET
// ONE LIGHTWEIGHT PERIODIC TASK PER CLOCK DOMAIN. DOMAINS TICK
// INDEPENDENTLY; A DOMAIN NEVER OVERLAPS WITH ITSELF (ITS MUTEX IS HELD
// FOR THE FULL ITERATION). STOP IS COOPERATIVE: THE FLAG PREVENTS THE
// NEXT RESCHEDULE, join() WAITS OUT ANY IN-FLIGHT ITERATION.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::domain::{Domain, FreqControl};
use crate::event::now_ns;
use crate::sampler::CounterSource;
use crate::tunables;

pub struct Governor<S, F> {
    domains: Vec<Arc<Domain<S, F>>>,
    handles: Vec<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    interval_us: u64,
}

impl<S, F> Governor<S, F>
where
    S: CounterSource + Send + Sync + 'static,
    F: FreqControl + Send + Sync + 'static,
{
    pub fn new(interval_us: u64, shutdown: Arc<AtomicBool>) -> Self {
        Self {
            domains: Vec::new(),
            handles: Vec::new(),
            shutdown,
            interval_us,
        }
    }

    pub fn add(&mut self, domain: Domain<S, F>) -> Arc<Domain<S, F>> {
        let domain = Arc::new(domain);
        self.domains.push(domain.clone());
        domain
    }

    pub fn domains(&self) -> &[Arc<Domain<S, F>>] {
        &self.domains
    }

    pub fn running(&self) -> bool {
        !self.handles.is_empty()
    }

    pub fn start(&mut self) {
        for domain in &self.domains {
            let domain = domain.clone();
            let shutdown = self.shutdown.clone();
            let interval_us = self.interval_us;

            self.handles.push(thread::spawn(move || {
                while !shutdown.load(Ordering::Relaxed) {
                    // PHASE-ALIGNED: SHORTEN THE DELAY BY HOW FAR THE
                    // CLOCK ALREADY IS INTO THE CURRENT INTERVAL, SO
                    // CONSECUTIVE TICKS DO NOT DRIFT
                    let now_us = now_ns() / 1_000;
                    let delay_us = interval_us - (now_us % interval_us);
                    thread::sleep(Duration::from_micros(delay_us));

                    if shutdown.load(Ordering::Relaxed) {
                        break;
                    }

                    // ONE CONSISTENT THRESHOLD SNAPSHOT PER ITERATION
                    domain.iterate(tunables::up_threshold());
                }
            }));
        }
    }

    // NO-OP WHEN NOT RUNNING. OTHERWISE WAITS FOR EVERY DOMAIN TASK TO
    // FINISH ITS CURRENT ITERATION -- NOBODY OBSERVES TORN-DOWN STATE.
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}
