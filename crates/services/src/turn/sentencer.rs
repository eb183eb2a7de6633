//! Sentence-boundary splitter for the LLM output buffer (spec.md §4.3 step
//! 3, §9 Open Question (b)). Scans for a terminator among `. ? ! । ॥ \n`
//! and splits at the *first* one found, repeating until no terminator
//! remains in the buffer -- unlike the reference `_stream_llm_to_tts` loop,
//! which breaks after the first delimiter per received chunk, this drains
//! every ready sentence a chunk contains, which the sentencer round-trip
//! property (spec.md §8) requires.
//!
//! Preserved as-is per spec.md §9(b): a delimiter scan will incorrectly
//! split on "." inside abbreviations ("Mr. Smith"). Not fixed.

const TERMINATORS: [char; 6] = ['.', '?', '!', '\n', '\u{0964}', '\u{0965}'];

#[derive(Debug, Default)]
pub struct Sentencer {
    buffer: String,
}

impl Sentencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk of LLM output. Returns zero or more ready sentences,
    /// each including its terminator, in the order they appear.
    pub fn push(&mut self, chunk: &str) -> Vec<String> {
        self.buffer.push_str(chunk);
        let mut ready = Vec::new();
        while let Some(pos) = self.buffer.find(TERMINATORS) {
            let term_len = self.buffer[pos..].chars().next().unwrap().len_utf8();
            let split_at = pos + term_len;
            let sentence: String = self.buffer.drain(..split_at).collect();
            ready.push(sentence);
        }
        ready
    }

    /// Called once the LLM stream has ended. Returns the remainder, if any,
    /// as a final sentence.
    pub fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.buffer))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_first_terminator_per_call_and_drains_all_in_one_chunk() {
        let mut sentencer = Sentencer::new();
        let ready = sentencer.push("One. Two. Three");
        assert_eq!(ready, vec!["One.".to_string(), " Two.".to_string()]);
        let last = sentencer.finish().unwrap();
        assert_eq!(last, " Three");
    }

    #[test]
    fn accumulates_across_chunks_until_terminator_arrives() {
        let mut sentencer = Sentencer::new();
        assert!(sentencer.push("Hello ").is_empty());
        assert!(sentencer.push("wor").is_empty());
        let ready = sentencer.push("ld.");
        assert_eq!(ready, vec!["Hello world.".to_string()]);
    }

    #[test]
    fn splits_on_devanagari_danda() {
        let mut sentencer = Sentencer::new();
        let ready = sentencer.push("नमस्ते।");
        assert_eq!(ready, vec!["नमस्ते।".to_string()]);
    }

    #[test]
    fn finish_on_empty_buffer_returns_none() {
        let mut sentencer = Sentencer::new();
        sentencer.push("done.");
        assert!(sentencer.finish().is_none());
    }

    #[test]
    fn round_trip_reconstructs_original_text() {
        let text = "One. Two? Three! Four";
        let mut sentencer = Sentencer::new();
        let mut emitted = sentencer.push(text);
        if let Some(rest) = sentencer.finish() {
            emitted.push(rest);
        }
        assert_eq!(emitted.concat(), text);
    }
}
