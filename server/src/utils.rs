use rand::Rng;
use shared::Timestamp;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const COLORS: [&str; 6] = [
    "#059669", "#3b82f6", "#ef4444", "#f59e0b", "#8b5cf6", "#ec4899",
];
const FALLBACK_COLOR: &str = "#64748b";

const ROOM_CODE_LEN: usize = 4;
const ROOM_CODE_CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";

// Get current timestamp in milliseconds
pub fn get_timestamp() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}

// First palette color nobody in the room is wearing yet
pub fn generate_color<'a, I>(used: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let used: Vec<&str> = used.into_iter().collect();
    COLORS
        .iter()
        .find(|color| !used.contains(*color))
        .unwrap_or(&FALLBACK_COLOR)
        .to_string()
}

pub fn generate_room_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..ROOM_CODE_LEN)
        .map(|_| ROOM_CODE_CHARS[rng.gen_range(0..ROOM_CODE_CHARS.len())] as char)
        .collect()
}
