/// Longest accepted room number. Feed rows with a longer one are skipped.
pub const MAX_ROOM_NUMBER_LEN: usize = 16;

/// Longest free-text field (guest name, room type).
pub const MAX_TEXT_LEN: usize = 256;

/// Rows accepted from one feed fetch, header included.
pub const MAX_FEED_ROWS: usize = 5_000;

/// Rooms held by the store.
pub const MAX_ROOMS: usize = 2_000;

/// Activity entries kept in memory; the oldest are dropped past this.
pub const MAX_ACTIVITY_ENTRIES: usize = 50_000;

/// Sync outcomes kept in memory; the oldest are dropped past this.
pub const MAX_SYNC_HISTORY: usize = 500;

/// Staff name length accepted by the directory.
pub const MAX_STAFF_NAME_LEN: usize = 64;
