//! Worker fan-out for per-stage processing.

use parking_lot::Mutex;
use std::thread;

/// Runs `task` over every element on a pool of scoped threads bounded by
/// the machine's available parallelism, returning results in input order.
/// Panics in a task propagate to the caller.
pub fn run_tasks<T, R>(tasks: Vec<T>, task: impl Fn(T) -> R + Sync) -> Vec<R>
where
    T: Send,
    R: Send,
{
    let parallelism = thread::available_parallelism().map_or(1, usize::from);
    let workers = parallelism.min(tasks.len());
    if workers <= 1 {
        return tasks.into_iter().map(task).collect();
    }

    let queue = Mutex::new(tasks.into_iter().enumerate());
    let task = &task;
    let mut indexed: Vec<(usize, R)> = thread::scope(|scope| {
        let handles: Vec<_> = (0..workers)
            .map(|_| {
                scope.spawn(|| {
                    let mut done = Vec::new();
                    loop {
                        let next = queue.lock().next();
                        match next {
                            Some((index, item)) => done.push((index, task(item))),
                            None => break done,
                        }
                    }
                })
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|handle| handle.join().unwrap())
            .collect()
    });
    indexed.sort_by_key(|(index, _)| *index);
    indexed.into_iter().map(|(_, result)| result).collect()
}

#[cfg(test)]
mod tests {
    use super::run_tasks;

    #[test]
    fn results_keep_input_order() {
        let inputs: Vec<u64> = (0..256).collect();
        let outputs = run_tasks(inputs.clone(), |n| n * n);
        let expected: Vec<u64> = inputs.iter().map(|n| n * n).collect();
        assert_eq!(outputs, expected);
    }

    #[test]
    fn empty_input() {
        let outputs: Vec<u32> = run_tasks(Vec::<u32>::new(), |n| n);
        assert!(outputs.is_empty());
    }

    #[test]
    fn borrows_environment() {
        let base = 10;
        let outputs = run_tasks(vec![1, 2, 3], |n| n + base);
        assert_eq!(outputs, vec![11, 12, 13]);
    }
}
