//! Notes - メモ欄のステータスマーカー
//!
//! 旧データではステータス列がなく、メモ欄の `[APPROVED]` のような
//! マーカーから現在状態を導出していました。ここではその読み取りと、
//! 遷移ごとのマーカー追記を扱います。
//!
//! マーカーは大文字・角括弧付きの完全一致のみ。`[approved]` や
//! 括弧なしの `APPROVED` は単なる文章として扱います。

use super::status::ReturnStatus;

/// Derives the current status from the markers in `notes`.
///
/// No notes, empty notes, or notes without a marker yield `PENDING`.
/// With several markers the most advanced one in workflow order wins.
pub fn extract_status(notes: Option<&str>) -> ReturnStatus {
    let Some(text) = notes else {
        return ReturnStatus::Pending;
    };
    ReturnStatus::ALL
        .into_iter()
        .filter(|status| text.contains(status.marker()))
        .max_by_key(|status| status.workflow_rank())
        .unwrap_or(ReturnStatus::Pending)
}

/// 自由記述からステータスマーカーの角括弧を外す
///
/// 外した結果として新しいマーカーができる入力（`[[PROCESSED]]` など）もあるので、
/// 変化がなくなるまで繰り返します。置換のたびに 2 文字ずつ短くなるので必ず止まります。
pub fn sanitize(text: &str) -> String {
    let mut current = text.to_string();
    loop {
        let next = ReturnStatus::ALL
            .into_iter()
            .fold(current.clone(), |acc, status| {
                acc.replace(status.marker(), status.as_str())
            });
        if next == current {
            return current;
        }
        current = next;
    }
}

/// 遷移ごとに `[STATUS] actor: comment` の行を追記する
///
/// actor と comment はどちらも利用者の入力なので sanitize してから書きます。
pub fn append_marker(
    notes: Option<&str>,
    status: ReturnStatus,
    actor: &str,
    comment: Option<&str>,
) -> String {
    let actor = sanitize(actor);
    let line = match comment.map(str::trim).filter(|c| !c.is_empty()) {
        Some(comment) => format!("{} {}: {}", status.marker(), actor, sanitize(comment)),
        None => format!("{} {}", status.marker(), actor),
    };
    match notes.filter(|existing| !existing.is_empty()) {
        Some(existing) => format!("{existing}\n{line}"),
        None => line,
    }
}
