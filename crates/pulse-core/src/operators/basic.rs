#![forbid(unsafe_code)]

//! Per-value operators: `map`, `filter`, `tap`, `take`, and the
//! `distinct_until_changed` family.

use std::rc::Rc;

use crate::stream::{Notification, Stream, Subscriber};

impl<T: 'static> Stream<T> {
    /// Transform each value.
    pub fn map<U: 'static>(&self, f: impl Fn(T) -> U + 'static) -> Stream<U> {
        let f = Rc::new(f);
        self.operate(move || {
            let f = Rc::clone(&f);
            move |out: &Subscriber<_>, n: Notification<T>| out.emit(n.map(|v| f(v)))
        })
    }

    /// Keep values matching `predicate`.
    pub fn filter(&self, predicate: impl Fn(&T) -> bool + 'static) -> Stream<T> {
        let predicate = Rc::new(predicate);
        self.operate(move || {
            let predicate = Rc::clone(&predicate);
            move |out: &Subscriber<_>, n: Notification<T>| match n {
                Notification::Next(v) if !predicate(&v) => {}
                other => out.emit(other),
            }
        })
    }

    /// Observe each value without changing the stream.
    pub fn tap(&self, f: impl Fn(&T) + 'static) -> Stream<T> {
        let f = Rc::new(f);
        self.operate(move || {
            let f = Rc::clone(&f);
            move |out: &Subscriber<_>, n: Notification<T>| {
                if let Notification::Next(v) = &n {
                    f(v);
                }
                out.emit(n);
            }
        })
    }

    /// Emit the first `count` values, then complete.
    pub fn take(&self, count: usize) -> Stream<T> {
        if count == 0 {
            return Stream::empty();
        }
        self.operate(move || {
            let mut seen = 0;
            move |out: &Subscriber<_>, n: Notification<T>| match n {
                Notification::Next(v) => {
                    seen += 1;
                    out.next(v);
                    if seen >= count {
                        out.complete();
                    }
                }
                other => out.emit(other),
            }
        })
    }
}

impl<T: Clone + 'static> Stream<T> {
    /// Drop values that `same` considers equal to the previous emitted one.
    pub fn distinct_until_changed_by(&self, same: impl Fn(&T, &T) -> bool + 'static) -> Stream<T> {
        let same = Rc::new(same);
        self.operate(move || {
            let same = Rc::clone(&same);
            let mut last: Option<T> = None;
            move |out: &Subscriber<_>, n: Notification<T>| match n {
                Notification::Next(v) => {
                    if last.as_ref().is_some_and(|prev| same(prev, &v)) {
                        return;
                    }
                    last = Some(v.clone());
                    out.next(v);
                }
                other => out.emit(other),
            }
        })
    }
}

impl<T: Clone + PartialEq + 'static> Stream<T> {
    /// Drop values equal to the previous emitted one.
    pub fn distinct_until_changed(&self) -> Stream<T> {
        self.distinct_until_changed_by(|a, b| a == b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StreamError;
    use crate::subject::Subject;
    use std::cell::RefCell;

    fn values<T: Clone + 'static>(stream: &Stream<T>) -> Rc<RefCell<Vec<Notification<T>>>> {
        let log = Rc::new(RefCell::new(Vec::new()));
        let l = Rc::clone(&log);
        stream.subscribe(move |n| l.borrow_mut().push(n)).detach();
        log
    }

    #[test]
    fn map_transforms_values() {
        let s: Stream<i32> = [1, 2].into_iter().collect();
        let log = values(&s.map(|v| v * 10));
        assert_eq!(
            *log.borrow(),
            vec![
                Notification::Next(10),
                Notification::Next(20),
                Notification::Complete
            ]
        );
    }

    #[test]
    fn map_forwards_errors() {
        let err = StreamError::msg("e");
        let log = values(&Stream::<i32>::throw(err.clone()).map(|v| v + 1));
        assert_eq!(*log.borrow(), vec![Notification::Error(err)]);
    }

    #[test]
    fn filter_drops_rejected() {
        let s: Stream<i32> = (1..=5).collect();
        let log = values(&s.filter(|v| v % 2 == 1));
        assert_eq!(log.borrow().len(), 4);
    }

    #[test]
    fn tap_sees_each_value() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = Rc::clone(&seen);
        let stream: Stream<i32> = [3, 4].into_iter().collect();
        let _log = values(&stream.tap(move |v| s.borrow_mut().push(*v)));
        assert_eq!(*seen.borrow(), vec![3, 4]);
    }

    #[test]
    fn take_completes_and_unsubscribes_upstream() {
        let subject = Subject::new();
        let log = values(&subject.as_stream().take(2));
        subject.next(1);
        assert_eq!(subject.observer_count(), 1);
        subject.next(2);
        subject.next(3);
        assert_eq!(
            *log.borrow(),
            vec![
                Notification::Next(1),
                Notification::Next(2),
                Notification::Complete
            ]
        );
        assert_eq!(subject.observer_count(), 0);
    }

    #[test]
    fn take_zero_is_empty() {
        let log = values(&Stream::of(1).take(0));
        assert_eq!(*log.borrow(), vec![Notification::Complete]);
    }

    #[test]
    fn distinct_drops_consecutive_duplicates_only() {
        let s: Stream<i32> = [1, 1, 2, 2, 1].into_iter().collect();
        let log = values(&s.distinct_until_changed());
        assert_eq!(
            *log.borrow(),
            vec![
                Notification::Next(1),
                Notification::Next(2),
                Notification::Next(1),
                Notification::Complete
            ]
        );
    }

    #[test]
    fn distinct_by_custom_comparator() {
        let s: Stream<&str> = ["a", "A", "b"].into_iter().collect();
        let log = values(&s.distinct_until_changed_by(|a, b| a.eq_ignore_ascii_case(b)));
        assert_eq!(log.borrow().len(), 3);
    }
}
