//! Sequence-player and stream-player metadata records

/// A sequence player: a polyphony/channel/heap budget for the sound engine.
///
/// A zero heap size or empty channel mask means "determined at runtime".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequencePlayer {
    pub max_sequences: u16,
    /// Bitmask of hardware channels (bit n = channel n) this player may use.
    pub channels: u16,
    pub heap_size: u32,
}

impl Default for SequencePlayer {
    fn default() -> Self {
        Self {
            max_sequences: 1,
            channels: 0,
            heap_size: 0,
        }
    }
}

/// A stream player: an ordered list of hardware channel indices (0..=15).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamPlayer {
    pub channels: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_player_defaults() {
        let player = SequencePlayer::default();
        assert_eq!(player.max_sequences, 1);
        assert_eq!(player.channels, 0);
        assert_eq!(player.heap_size, 0);
    }

    #[test]
    fn stream_player_keeps_order() {
        let player = StreamPlayer {
            channels: vec![4, 5],
        };
        assert_eq!(player.channels, vec![4, 5]);
    }
}
