#![forbid(unsafe_code)]

//! Stream operators.
//!
//! Most operators are inherent methods on [`Stream`](crate::Stream) built on
//! [`Stream::operate`](crate::Stream::operate). [`coalesce`](coalesce::coalesce)
//! is a free function returning an operator for use with
//! [`Stream::pipe`](crate::Stream::pipe), since it is configured rather than
//! chained.

pub mod basic;
pub mod coalesce;
pub mod switch;
