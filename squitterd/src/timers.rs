/// Second-granularity countdown for the periodic reports.
///
/// Ticked once per second from the housekeeping timer. Fires when the
/// countdown reaches zero, then rearms with the full interval. An
/// interval of zero disables it entirely.
#[derive(Clone, Copy, Debug)]
pub struct Countdown {
    interval: u32,
    left: u32,
}

impl Countdown {
    /// `first` delays the initial firing independently of `interval`, so
    /// the first report can go out shortly after start-up.
    pub fn new(interval: u32, first: u32) -> Self {
        if interval == 0 {
            Self { interval: 0, left: 0 }
        }
        else {
            Self {
                interval,
                left: first.clamp(1, interval),
            }
        }
    }

    pub fn tick(&mut self) -> bool {
        if self.left == 0 {
            return false;
        }

        self.left -= 1;
        if self.left == 0 {
            self.left = self.interval;
            true
        }
        else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::timers::Countdown;

    #[test]
    fn it_fires_first_after_the_initial_delay_then_periodically() {
        let mut countdown = Countdown::new(10, 3);

        let fired: Vec<u32> = (1..=30).filter(|_| countdown.tick()).collect();
        assert_eq!(fired, vec![3, 13, 23]);
    }

    #[test]
    fn it_never_fires_when_disabled() {
        let mut countdown = Countdown::new(0, 5);
        assert!((0..100).all(|_| !countdown.tick()));
    }

    #[test]
    fn the_initial_delay_is_capped_at_the_interval() {
        let mut countdown = Countdown::new(2, 10);
        assert!(!countdown.tick());
        assert!(countdown.tick());
    }
}
