/// Built-in question/SQL pairs loaded into an empty or partial store
/// Each pair goes through the normal normalize and generalize path; a word set
/// already present keeps its learned template.
use crate::learning::pattern::Provenance;
use crate::learning::pattern_store::PatternStore;
use crate::nlq::normalizer::Normalizer;
use crate::template::generalizer::SqlGeneralizer;

pub const SEED_EXAMPLES: &[(&str, &str)] = &[
    ("Сколько всего видео есть в системе?", "SELECT COUNT(*) FROM videos"),
    (
        "Сколько видео набрало больше 1000 просмотров?",
        "SELECT COUNT(*) FROM videos WHERE views_count > 1000",
    ),
    (
        "На сколько просмотров в сумме выросли все видео 2025-11-28?",
        "SELECT SUM(delta_views_count) FROM video_snapshots WHERE DATE(created_at) = '2025-11-28'",
    ),
    (
        "Сколько разных видео получали новые просмотры 2025-11-27?",
        "SELECT COUNT(DISTINCT video_id) FROM video_snapshots WHERE DATE(created_at) = '2025-11-27' AND delta_views_count > 0",
    ),
    (
        "Сколько замеров статистики с отрицательным приростом просмотров?",
        "SELECT COUNT(*) FROM video_snapshots WHERE delta_views_count < 0",
    ),
    (
        "Какое суммарное количество просмотров набрали все видео, опубликованные в июне 2025 года?",
        "SELECT SUM(views_count) FROM videos WHERE EXTRACT(YEAR FROM video_created_at) = 2025 AND EXTRACT(MONTH FROM video_created_at) = 6",
    ),
    (
        "Сколько видео у креатора с id 0123456789abcdef0123456789abcdef вышло с 1 по 5 ноября 2025?",
        "SELECT COUNT(*) FROM videos WHERE creator_id = '0123456789abcdef0123456789abcdef' AND DATE(video_created_at) BETWEEN '2025-11-01' AND '2025-11-05'",
    ),
    (
        "Сколько видео у креатора с id 0123456789abcdef0123456789abcdef набрали больше 1000 просмотров?",
        "SELECT COUNT(*) FROM videos WHERE creator_id = '0123456789abcdef0123456789abcdef' AND views_count > 1000",
    ),
    (
        "На сколько выросли просмотры видео с 10:00 до 15:00 2025-11-28?",
        "SELECT SUM(delta_views_count) FROM video_snapshots WHERE DATE(created_at) = '2025-11-28' AND EXTRACT(HOUR FROM created_at) BETWEEN 10 AND 14",
    ),
];

/// Insert seed patterns whose word sets are not yet known; returns how many were added
pub fn seed_store(store: &PatternStore) -> usize {
    let normalizer = Normalizer::new();
    let generalizer = SqlGeneralizer::new();

    let mut added = 0;
    for (question, sql) in SEED_EXAMPLES {
        let words = normalizer.normalize(question);
        let template = generalizer.generalize(sql);
        if store.insert_if_absent(words, &template, question, Provenance::Seed) {
            added += 1;
        }
    }

    if added > 0 {
        tracing::info!(added, "seed patterns inserted");
    }
    added
}
