// ファイルを使った storagemanager の具体的な実装
pub mod disk;

// メモリ上の storagemanager. テスト用
pub mod memory;

// No-steal の clock-sweep による buffermanager の具体的な実装
pub mod clocksweep;

// Heap page に tuple を置く tablefile
pub mod heap;
