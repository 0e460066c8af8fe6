//! ユーザーに見せるエラー
//!
//! どれも致命的ではなく、その操作を断るだけでフレームループは止めない。

use thiserror::Error;

use crate::record::Phase;

/// セッション操作の Result
pub type SessionResult<T> = Result<T, SessionError>;

#[derive(Debug, Error)]
pub enum SessionError {
    /// 学習に足りるだけのフレームが記録されていない
    #[error("not enough recorded frames: person1={person1}, person2={person2} (need more than {minimum} each)")]
    InsufficientData {
        person1: usize,
        person2: usize,
        minimum: usize,
    },

    /// 学習が終わる前に予測やダンスモードを要求した
    #[error("no trained model yet; record both people first")]
    Untrained,

    /// すでに記録中
    #[error("recording already in progress ({0:?})")]
    RecordingInProgress(Phase),

    /// バックグラウンドで学習中
    #[error("training already in progress")]
    TrainingInProgress,

    /// 学習そのものが失敗した
    #[error("training failed: {0}")]
    Training(String),

    #[error("pose vector must have {expected} values, got {actual}")]
    InvalidWidth { expected: usize, actual: usize },

    #[error("skeleton must have {expected} landmarks, got {actual}")]
    InvalidSkeleton { expected: usize, actual: usize },

    /// カメラが無い・使えない
    #[error("capture device unavailable: {0}")]
    CaptureUnavailable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SessionError::InsufficientData {
            person1: 3,
            person2: 0,
            minimum: 10,
        };
        assert_eq!(
            err.to_string(),
            "not enough recorded frames: person1=3, person2=0 (need more than 10 each)"
        );

        let err = SessionError::RecordingInProgress(Phase::RecordingBoth);
        assert_eq!(err.to_string(), "recording already in progress (RecordingBoth)");
    }
}
