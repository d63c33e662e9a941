//! Autorun, When and Reaction
//!
//! Thin wrappers that build a [`Reaction`] from plain closures and arm it.
//! Every function returns a [`Disposer`]; dropping it leaves the reaction
//! running.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use tracing::error;

use super::scheduler::TaskScheduler;
use crate::error::Result;
use crate::reactive::{Disposer, Reaction, Runtime};

/// Run `view` now and again whenever anything it read changes.
///
/// Without a name, one of the form `Autorun@N` is generated. If the first
/// run fails the reaction is disposed and the error returned.
///
/// # Example
///
/// ```rust
/// use std::cell::RefCell;
/// use std::rc::Rc;
/// use strand_core::api::autorun;
/// use strand_core::reactive::{Observable, Runtime};
///
/// let rt = Runtime::new();
/// let x = Observable::new(&rt, 1);
/// let log = Rc::new(RefCell::new(Vec::new()));
///
/// let (x2, l) = (x.clone(), log.clone());
/// let disposer = autorun(&rt, None, move || l.borrow_mut().push(x2.get())).unwrap();
///
/// rt.batch(|| {
///     x.set(2);
///     x.set(3);
/// });
/// assert_eq!(*log.borrow(), vec![1, 3]);
///
/// disposer.dispose();
/// x.set(4);
/// assert_eq!(*log.borrow(), vec![1, 3]);
/// ```
pub fn autorun<F>(runtime: &Runtime, name: Option<&str>, view: F) -> Result<Disposer>
where
    F: Fn() + 'static,
{
    let name = name.map_or_else(|| runtime.unique_name("Autorun"), str::to_string);
    let reaction = Reaction::new(runtime, name, move |r| r.track(&view));
    arm(reaction)
}

/// Watch `predicate` until it returns true, then dispose and run `effect`
/// once, untracked and inside a batch.
///
/// If the predicate already holds, the effect runs before `when` returns.
pub fn when<P, E>(runtime: &Runtime, predicate: P, effect: E) -> Result<Disposer>
where
    P: Fn() -> bool + 'static,
    E: FnOnce() + 'static,
{
    let name = runtime.unique_name("When");
    let effect = RefCell::new(Some(effect));
    let reaction = Reaction::new(runtime, name, move |r| {
        if r.track(&predicate)? {
            let name = r.name();
            r.dispose();
            let pending = effect.borrow_mut().take();
            if let Some(effect) = pending {
                r.runtime().action(&name, effect);
            }
        }
        Ok(())
    });
    arm(reaction)
}

/// Like [`autorun`], but every run is deferred by `delay` on `scheduler`.
///
/// Changes arriving while a run is already pending are folded into it, so
/// a burst of writes inside one delay window produces a single run. The
/// first run is deferred too.
pub fn autorun_async<F>(
    runtime: &Runtime,
    scheduler: Rc<dyn TaskScheduler>,
    delay: Duration,
    view: F,
) -> Result<Disposer>
where
    F: Fn() + 'static,
{
    let name = runtime.unique_name("AutorunAsync");
    let view = Rc::new(view);
    let pending = Rc::new(Cell::new(false));

    let reaction = Reaction::new(runtime, name, move |r| {
        if pending.replace(true) {
            return Ok(());
        }
        let (r, view, pending) = (r.clone(), view.clone(), pending.clone());
        scheduler.schedule(
            delay,
            Box::new(move || {
                pending.set(false);
                if r.is_disposed() {
                    return;
                }
                if let Err(err) = r.track(|| view()) {
                    error!(reaction = %r.name(), error = %err, "deferred autorun failed");
                }
            }),
        );
        Ok(())
    });
    arm(reaction)
}

/// Options for [`reaction`].
#[derive(Default)]
pub struct ReactionOptions {
    name: Option<String>,
    fire_immediately: bool,
    deferral: Option<(Duration, Rc<dyn TaskScheduler>)>,
}

impl ReactionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Also run the effect on the first evaluation of the expression.
    pub fn fire_immediately(mut self, fire: bool) -> Self {
        self.fire_immediately = fire;
        self
    }

    /// Defer each evaluation by `delay` on `scheduler`, folding changes that
    /// arrive while one is pending.
    pub fn delayed(mut self, scheduler: Rc<dyn TaskScheduler>, delay: Duration) -> Self {
        self.deferral = Some((delay, scheduler));
        self
    }
}

impl fmt::Debug for ReactionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReactionOptions")
            .field("name", &self.name)
            .field("fire_immediately", &self.fire_immediately)
            .field("delay", &self.deferral.as_ref().map(|(delay, _)| delay))
            .finish()
    }
}

/// Track `expression`, and pass its value to `effect` every time the
/// expression is re-evaluated.
///
/// Only the expression's reads are dependencies. The effect runs as an
/// action: untracked and batched. It is skipped on the first evaluation
/// unless [`ReactionOptions::fire_immediately`] is set.
pub fn reaction<T, X, F>(
    runtime: &Runtime,
    expression: X,
    effect: F,
    options: ReactionOptions,
) -> Result<Disposer>
where
    T: 'static,
    X: Fn() -> T + 'static,
    F: Fn(T) + 'static,
{
    let ReactionOptions {
        name,
        fire_immediately,
        deferral,
    } = options;
    let name = name.unwrap_or_else(|| runtime.unique_name("Reaction"));

    let first_run = Cell::new(true);
    let runner = Rc::new(move |r: &Reaction| -> Result<()> {
        if r.is_disposed() {
            return Ok(());
        }
        let value = r.track(&expression)?;
        if !first_run.replace(false) || fire_immediately {
            r.runtime().action(&r.name(), || effect(value));
        }
        Ok(())
    });

    let reaction = match deferral {
        None => Reaction::new(runtime, name, move |r| runner(r)),
        Some((delay, scheduler)) => {
            let pending = Rc::new(Cell::new(false));
            Reaction::new(runtime, name, move |r| {
                if pending.replace(true) {
                    return Ok(());
                }
                let (r, runner, pending) = (r.clone(), runner.clone(), pending.clone());
                scheduler.schedule(
                    delay,
                    Box::new(move || {
                        pending.set(false);
                        if let Err(err) = runner(&r) {
                            error!(reaction = %r.name(), error = %err, "deferred reaction failed");
                        }
                    }),
                );
                Ok(())
            })
        }
    };
    arm(reaction)
}

fn arm(reaction: Reaction) -> Result<Disposer> {
    let disposer = reaction.disposer();
    if let Err(err) = reaction.schedule() {
        reaction.dispose();
        return Err(err);
    }
    Ok(disposer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{TokioScheduler, VirtualClock};
    use crate::reactive::{Computed, Observable};

    fn recorder<T>() -> Rc<RefCell<Vec<T>>> {
        Rc::new(RefCell::new(Vec::new()))
    }

    #[test]
    fn autorun_generates_a_name() {
        let rt = Runtime::new();
        let disposer = autorun(&rt, None, || {}).unwrap();
        let name = rt.name_of(disposer.id()).unwrap();
        assert!(name.starts_with("Autorun@"));

        let named = autorun(&rt, Some("render"), || {}).unwrap();
        assert_eq!(rt.name_of(named.id()).as_deref(), Some("render"));
    }

    #[test]
    fn autorun_tracks_through_computeds() {
        let rt = Runtime::new();
        let first = Observable::new(&rt, "Ada".to_string());
        let last = Observable::new(&rt, "Lovelace".to_string());
        let (f, l) = (first.clone(), last.clone());
        let full = Computed::new(&rt, move || format!("{} {}", f.get(), l.get()));

        let log = recorder();
        let (full2, log2) = (full.clone(), log.clone());
        let _disposer = autorun(&rt, None, move || {
            if let Ok(name) = full2.get() {
                log2.borrow_mut().push(name);
            }
        })
        .unwrap();

        last.set("Byron".to_string());
        assert_eq!(*log.borrow(), vec!["Ada Lovelace", "Ada Byron"]);
    }

    #[test]
    fn when_fires_once_and_disposes() {
        let rt = Runtime::new();
        let count = Observable::new(&rt, 0);
        let fired = Rc::new(Cell::new(0));

        let (c, f) = (count.clone(), fired.clone());
        let disposer = when(&rt, move || c.get() >= 3, move || f.set(f.get() + 1)).unwrap();

        count.set(1);
        count.set(2);
        assert_eq!(fired.get(), 0);
        assert!(!disposer.is_disposed());

        count.set(3);
        assert_eq!(fired.get(), 1);
        assert!(disposer.is_disposed());
        assert_eq!(count.observer_count(), 0);

        count.set(4);
        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn when_with_a_true_predicate_fires_immediately() {
        let rt = Runtime::new();
        let ready = Observable::new(&rt, true);
        let fired = Rc::new(Cell::new(false));

        let (r, f) = (ready.clone(), fired.clone());
        let disposer = when(&rt, move || r.get(), move || f.set(true)).unwrap();

        assert!(fired.get());
        assert!(disposer.is_disposed());
        assert_eq!(ready.observer_count(), 0);
    }

    #[test]
    fn when_effect_is_untracked() {
        let rt = Runtime::new();
        let gate = Observable::new(&rt, false);
        let other = Observable::new(&rt, 0);
        let seen = recorder();

        let (g, o, s) = (gate.clone(), other.clone(), seen.clone());
        when(&rt, move || g.get(), move || s.borrow_mut().push(o.get())).unwrap();

        gate.set(true);
        other.set(1);
        assert_eq!(*seen.borrow(), vec![0]);
        assert_eq!(other.observer_count(), 0);
    }

    #[test]
    fn reaction_skips_the_first_run_by_default() {
        let rt = Runtime::new();
        let cell = Observable::new(&rt, 1);
        let log = recorder();

        let (c, l) = (cell.clone(), log.clone());
        let _disposer = reaction(
            &rt,
            move || c.get() * 10,
            move |v| l.borrow_mut().push(v),
            ReactionOptions::new(),
        )
        .unwrap();
        assert!(log.borrow().is_empty());

        cell.set(2);
        cell.set(3);
        assert_eq!(*log.borrow(), vec![20, 30]);
    }

    #[test]
    fn reaction_fire_immediately() {
        let rt = Runtime::new();
        let cell = Observable::new(&rt, 1);
        let log = recorder();

        let (c, l) = (cell.clone(), log.clone());
        let _disposer = reaction(
            &rt,
            move || c.get(),
            move |v| l.borrow_mut().push(v),
            ReactionOptions::new().named("echo").fire_immediately(true),
        )
        .unwrap();
        assert_eq!(*log.borrow(), vec![1]);
    }

    #[test]
    fn reaction_effect_reads_are_not_dependencies() {
        let rt = Runtime::new();
        let source = Observable::new(&rt, 0);
        let side = Observable::new(&rt, 100);
        let log = recorder();

        let (src, sd, l) = (source.clone(), side.clone(), log.clone());
        let _disposer = reaction(
            &rt,
            move || src.get(),
            move |v| l.borrow_mut().push(v + sd.get()),
            ReactionOptions::new(),
        )
        .unwrap();

        side.set(200);
        assert!(log.borrow().is_empty());
        assert_eq!(side.observer_count(), 0);

        source.set(1);
        assert_eq!(*log.borrow(), vec![201]);
    }

    #[test]
    fn reaction_effect_writes_are_batched() {
        let rt = Runtime::new();
        let source = Observable::new(&rt, 0);
        let a = Observable::new(&rt, 0);
        let b = Observable::new(&rt, 0);
        let sums = recorder();

        let (x, y, s) = (a.clone(), b.clone(), sums.clone());
        let _watch = autorun(&rt, None, move || s.borrow_mut().push(x.get() + y.get())).unwrap();

        let (src, x, y) = (source.clone(), a.clone(), b.clone());
        let _disposer = reaction(
            &rt,
            move || src.get(),
            move |v| {
                x.set(v);
                y.set(v);
            },
            ReactionOptions::new(),
        )
        .unwrap();

        source.set(5);
        assert_eq!(*sums.borrow(), vec![0, 10]);
    }

    #[test]
    fn delayed_reaction_folds_bursts() {
        let rt = Runtime::new();
        let clock = Rc::new(VirtualClock::new());
        let cell = Observable::new(&rt, 0);
        let log = recorder();

        let (c, l) = (cell.clone(), log.clone());
        let disposer = reaction(
            &rt,
            move || c.get(),
            move |v| l.borrow_mut().push(v),
            ReactionOptions::new().delayed(clock.clone(), Duration::from_millis(10)),
        )
        .unwrap();

        // The first evaluation is deferred as well.
        assert_eq!(clock.pending(), 1);
        clock.advance(Duration::from_millis(10));
        assert!(log.borrow().is_empty());

        cell.set(1);
        cell.set(2);
        cell.set(3);
        assert_eq!(clock.pending(), 1);
        clock.advance(Duration::from_millis(10));
        assert_eq!(*log.borrow(), vec![3]);

        cell.set(4);
        disposer.dispose();
        clock.advance(Duration::from_millis(10));
        assert_eq!(*log.borrow(), vec![3]);
    }

    #[test]
    fn autorun_async_coalesces_within_the_delay() {
        let rt = Runtime::new();
        let clock = Rc::new(VirtualClock::new());
        let cell = Observable::new(&rt, 1);
        let log = recorder();

        let (c, l) = (cell.clone(), log.clone());
        let _disposer = autorun_async(&rt, clock.clone(), Duration::from_millis(50), move || {
            l.borrow_mut().push(c.get())
        })
        .unwrap();
        assert!(log.borrow().is_empty());

        clock.advance(Duration::from_millis(50));
        assert_eq!(*log.borrow(), vec![1]);

        cell.set(2);
        clock.advance(Duration::from_millis(20));
        cell.set(3);
        assert_eq!(*log.borrow(), vec![1]);

        clock.advance(Duration::from_millis(30));
        assert_eq!(*log.borrow(), vec![1, 3]);
    }

    #[test]
    fn autorun_async_disposed_before_the_timer() {
        let rt = Runtime::new();
        let clock = Rc::new(VirtualClock::new());
        let cell = Observable::new(&rt, 1);
        let runs = Rc::new(Cell::new(0));

        let (c, r) = (cell.clone(), runs.clone());
        let disposer = autorun_async(&rt, clock.clone(), Duration::from_millis(5), move || {
            c.get();
            r.set(r.get() + 1);
        })
        .unwrap();
        disposer.dispose();

        clock.advance(Duration::from_millis(5));
        assert_eq!(runs.get(), 0);
        assert_eq!(cell.observer_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn autorun_async_on_tokio() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let rt = Runtime::new();
                let cell = Observable::new(&rt, 1);
                let log = recorder();

                let (c, l) = (cell.clone(), log.clone());
                let _disposer = autorun_async(
                    &rt,
                    Rc::new(TokioScheduler),
                    Duration::from_millis(50),
                    move || l.borrow_mut().push(c.get()),
                )
                .unwrap();
                assert!(log.borrow().is_empty());

                tokio::time::sleep(Duration::from_millis(60)).await;
                assert_eq!(*log.borrow(), vec![1]);

                cell.set(2);
                cell.set(3);
                tokio::time::sleep(Duration::from_millis(60)).await;
                assert_eq!(*log.borrow(), vec![1, 3]);
            })
            .await;
    }
}
