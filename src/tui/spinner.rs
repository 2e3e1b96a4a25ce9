use crate::config::SPINNER_FRAME_COUNT;

const BRAILLE_FRAMES: [char; SPINNER_FRAME_COUNT] = ['⠋', '⠙', '⠹', '⠸', '⠼', '⠴', '⠦', '⠧', '⠇', '⠏'];

pub fn frame(idx: usize) -> char {
    BRAILLE_FRAMES[idx % SPINNER_FRAME_COUNT]
}
