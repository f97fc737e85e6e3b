mod merge;
mod tracker;
