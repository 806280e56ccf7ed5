use crate::model::video::VideoRecord;
use chrono::{Datelike, FixedOffset, Timelike, Weekday};

/// Publication times are bucketed in Japan Standard Time.
pub const JST_OFFSET_HOURS: i32 = 9;

/// Weekday by hour-of-day publication counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostingHeatmap {
    counts: [[u32; 24]; 7],
}

impl PostingHeatmap {
    pub fn from_videos(videos: &[VideoRecord]) -> Self {
        let mut counts = [[0u32; 24]; 7];
        let Some(jst) = FixedOffset::east_opt(JST_OFFSET_HOURS * 3600) else {
            return PostingHeatmap { counts };
        };

        for video in videos {
            let local = video.published_at.with_timezone(&jst);
            counts[local.weekday().num_days_from_monday() as usize][local.hour() as usize] += 1;
        }

        PostingHeatmap { counts }
    }

    pub fn count(&self, weekday: Weekday, hour: u32) -> u32 {
        self.counts[weekday.num_days_from_monday() as usize]
            .get(hour as usize)
            .copied()
            .unwrap_or(0)
    }

    pub fn total(&self) -> u32 {
        self.counts.iter().flatten().sum()
    }

    /// Slot with the most publications. Ties go to the earliest slot in the week.
    pub fn busiest(&self) -> Option<(Weekday, u32, u32)> {
        let mut best: Option<(Weekday, u32, u32)> = None;
        let mut weekday = Weekday::Mon;
        for day in &self.counts {
            for (hour, &count) in day.iter().enumerate() {
                if count > best.map(|(_, _, c)| c).unwrap_or(0) {
                    best = Some((weekday, hour as u32, count));
                }
            }
            weekday = weekday.succ();
        }

        best
    }
}
