// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::point::Point;

fn point(metric: &str) -> Point {
    Point::new(metric, 1i64, 1_700_000_000_000, "src-1")
}

fn open_tmp(max_size: usize) -> anyhow::Result<(tempfile::TempDir, SqliteBuffer)> {
    let dir = tempfile::tempdir()?;
    let buf = SqliteBuffer::open(dir.path().join("buffer.db"), max_size)?;
    Ok((dir, buf))
}

#[test]
fn add_and_snapshot_preserves_order() -> anyhow::Result<()> {
    let (_dir, buf) = open_tmp(10)?;
    buf.add(&[point("a"), point("b"), point("c")]).expect("durable buffer write");
    let all = buf.snapshot();
    let names: Vec<&str> = all.iter().map(|p| p.metric.as_str()).collect();
    assert_eq!(names, vec!["a", "b", "c"]);
    Ok(())
}

#[test]
fn eviction_drops_oldest_first() -> anyhow::Result<()> {
    let (_dir, buf) = open_tmp(2)?;
    let evicted = buf.add(&[point("a"), point("b"), point("c")]).expect("durable buffer write");
    assert_eq!(evicted, 1);
    let all = buf.snapshot();
    let names: Vec<&str> = all.iter().map(|p| p.metric.as_str()).collect();
    assert_eq!(names, vec!["b", "c"]);
    Ok(())
}

#[test]
fn survives_reopen() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let db_path = dir.path().join("buffer.db");
    {
        let buf = SqliteBuffer::open(&db_path, 10)?;
        buf.add(&[point("a"), point("b")]).expect("durable buffer write");
    }
    let reopened = SqliteBuffer::open(&db_path, 10)?;
    assert_eq!(reopened.len(), 2);
    Ok(())
}

#[test]
fn clear_empties_buffer() -> anyhow::Result<()> {
    let (_dir, buf) = open_tmp(10)?;
    buf.add(&[point("a")]).expect("durable buffer write");
    buf.clear();
    assert_eq!(buf.len(), 0);
    Ok(())
}
