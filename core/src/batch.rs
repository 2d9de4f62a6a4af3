//! Fan a list of requests out over one scheduler and wait for all of them.
//!
//! # Design
//! Each job's callback writes into the slot at its own input index, so the
//! collected results line up with the inputs no matter which request
//! finishes first. Length mismatches are rejected before anything is queued.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::error::Error;
use crate::http::{RequestConfig, Response};
use crate::scheduler::Scheduler;

/// Run `urls[i]` with `configs[i]` for every `i` and return the outcomes in
/// input order.
///
/// Blocks until every request has finished. Fails with
/// `Error::InvalidArgument` and issues no request when the lists differ in
/// length.
pub fn perform_batch<U: AsRef<str>>(
    scheduler: &mut Scheduler,
    urls: &[U],
    configs: &[RequestConfig],
) -> Result<Vec<Result<Response, Error>>, Error> {
    let slots: Rc<RefCell<Vec<Option<Result<Response, Error>>>>> =
        Rc::new(RefCell::new((0..urls.len()).map(|_| None).collect()));

    let sink = Rc::clone(&slots);
    perform_batch_with(scheduler, urls, configs, move |index, outcome| {
        sink.borrow_mut()[index] = Some(outcome);
    })?;

    let collected = slots
        .borrow_mut()
        .drain(..)
        .enumerate()
        .map(|(index, slot)| {
            slot.unwrap_or_else(|| Err(Error::JobFailed(format!("batch item {index} never completed"))))
        })
        .collect();
    Ok(collected)
}

/// Like `perform_batch`, but hands each outcome to `on_each` along with its
/// input index as soon as it is delivered. Returns how many batch outcomes
/// reached `on_each`.
///
/// Waits by draining the scheduler, so jobs submitted before the batch are
/// delivered to their own callbacks too and are not counted.
pub fn perform_batch_with<U, F>(
    scheduler: &mut Scheduler,
    urls: &[U],
    configs: &[RequestConfig],
    on_each: F,
) -> Result<usize, Error>
where
    U: AsRef<str>,
    F: FnMut(usize, Result<Response, Error>) + 'static,
{
    if urls.len() != configs.len() {
        return Err(Error::InvalidArgument(format!(
            "batch has {} urls but {} configs",
            urls.len(),
            configs.len()
        )));
    }

    log::debug!("dispatching batch of {} requests", urls.len());
    let on_each = Rc::new(RefCell::new(on_each));
    let delivered = Rc::new(Cell::new(0usize));
    for (index, (url, config)) in urls.iter().zip(configs).enumerate() {
        let on_each = Rc::clone(&on_each);
        let delivered = Rc::clone(&delivered);
        scheduler.submit(url.as_ref(), config.clone(), move |outcome| {
            delivered.set(delivered.get() + 1);
            let mut on_each = on_each.borrow_mut();
            (*on_each)(index, outcome);
        });
    }

    scheduler.run();
    Ok(delivered.get())
}
