// SPDX-License-Identifier: GPL-3.0-only

//! Packet interleaving across streams
//!
//! Packets are held per stream and released in ascending decode time. A
//! packet is only released once every active stream has something queued, so
//! the container always sees the globally earliest packet next. When one
//! stream runs far ahead of the other (more than [`MAX_INTERLEAVE_DELTA_MS`]
//! buffered) the earliest packet is released anyway.

use super::backend::Packet;
use super::timeline::{Rational, compare, rescale};
use std::collections::VecDeque;

/// Largest span of buffered time before packets are forced out
pub const MAX_INTERLEAVE_DELTA_MS: i64 = 10_000;

#[derive(Debug)]
struct StreamQueue {
    time_base: Rational,
    active: bool,
    packets: VecDeque<Packet>,
}

#[derive(Debug, Default)]
pub struct Interleaver {
    streams: Vec<StreamQueue>,
}

impl Interleaver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the stream with index `index`
    pub fn add_stream(&mut self, index: usize, time_base: Rational) {
        if self.streams.len() <= index {
            self.streams.resize_with(index + 1, || StreamQueue {
                time_base: Rational::MILLISECONDS,
                active: false,
                packets: VecDeque::new(),
            });
        }
        self.streams[index] = StreamQueue {
            time_base,
            active: true,
            packets: VecDeque::new(),
        };
    }

    /// Stop waiting on a stream; its queued packets still drain
    pub fn retire(&mut self, index: usize) {
        if let Some(stream) = self.streams.get_mut(index) {
            stream.active = false;
        }
    }

    pub fn push(&mut self, packet: Packet) {
        if let Some(stream) = self.streams.get_mut(packet.stream_index) {
            stream.packets.push_back(packet);
        }
    }

    pub fn queued(&self) -> usize {
        self.streams.iter().map(|s| s.packets.len()).sum()
    }

    /// Stream holding the earliest queued packet
    fn earliest(&self) -> Option<usize> {
        let mut best: Option<(usize, i64, Rational)> = None;
        for (index, stream) in self.streams.iter().enumerate() {
            let Some(head) = stream.packets.front() else {
                continue;
            };
            let better = match best {
                None => true,
                Some((_, dts, base)) => compare(head.dts, stream.time_base, dts, base).is_lt(),
            };
            if better {
                best = Some((index, head.dts, stream.time_base));
            }
        }
        best.map(|(index, _, _)| index)
    }

    /// Buffered span in milliseconds between the earliest and latest packet
    fn buffered_span_ms(&self) -> i64 {
        let mut min = i64::MAX;
        let mut max = i64::MIN;
        for stream in &self.streams {
            for packet in [stream.packets.front(), stream.packets.back()].into_iter().flatten() {
                let ms = rescale(packet.dts, stream.time_base, Rational::MILLISECONDS);
                min = min.min(ms);
                max = max.max(ms);
            }
        }
        if min > max { 0 } else { max - min }
    }

    /// Next packet that can be written without breaking ordering
    pub fn pop_ready(&mut self) -> Option<Packet> {
        let all_ready = self
            .streams
            .iter()
            .filter(|s| s.active)
            .all(|s| !s.packets.is_empty());
        if !all_ready && self.buffered_span_ms() <= MAX_INTERLEAVE_DELTA_MS {
            return None;
        }
        let index = self.earliest()?;
        self.streams[index].packets.pop_front()
    }

    /// Every queued packet in ascending time
    pub fn drain_all(&mut self) -> Vec<Packet> {
        let mut out = Vec::with_capacity(self.queued());
        while let Some(index) = self.earliest() {
            if let Some(packet) = self.streams[index].packets.pop_front() {
                out.push(packet);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(stream: usize, dts: i64) -> Packet {
        Packet {
            data: vec![1],
            pts: dts,
            dts,
            duration: 1,
            keyframe: true,
            stream_index: stream,
            caps: None,
        }
    }

    fn interleaver() -> Interleaver {
        let mut il = Interleaver::new();
        il.add_stream(0, Rational::per_frame(10));
        il.add_stream(1, Rational::MILLISECONDS);
        il
    }

    #[test]
    fn test_waits_for_every_stream() {
        let mut il = interleaver();
        il.push(packet(0, 0));
        il.push(packet(0, 1));
        assert!(il.pop_ready().is_none());

        il.push(packet(1, 50));
        // video 0 ms, audio 50 ms, video 100 ms
        assert_eq!(il.pop_ready().map(|p| (p.stream_index, p.dts)), Some((0, 0)));
        assert_eq!(il.pop_ready().map(|p| (p.stream_index, p.dts)), Some((1, 50)));
        assert!(il.pop_ready().is_none());
    }

    #[test]
    fn test_large_span_forces_release() {
        let mut il = interleaver();
        il.push(packet(0, 0));
        il.push(packet(0, 101));
        let forced = il.pop_ready().expect("span over 10 s");
        assert_eq!(forced.dts, 0);
    }

    #[test]
    fn test_retired_stream_not_waited_on() {
        let mut il = interleaver();
        il.retire(1);
        il.push(packet(0, 3));
        assert_eq!(il.pop_ready().map(|p| p.dts), Some(3));
    }

    #[test]
    fn test_drain_all_orders_by_time() {
        let mut il = interleaver();
        il.push(packet(0, 2));
        il.push(packet(1, 100));
        il.push(packet(1, 250));
        let order: Vec<_> = il.drain_all().iter().map(|p| (p.stream_index, p.dts)).collect();
        assert_eq!(order, vec![(1, 100), (0, 2), (1, 250)]);
    }
}
