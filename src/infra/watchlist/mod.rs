pub mod regex_watch_list;

pub use regex_watch_list::RegexWatchList;
