use feed_store::FeedImageRecord;
use url::Url;
use uuid::Uuid;

/// Generate feeds of image records for benchmarks
pub struct FeedGenerator {
    feed_size: usize,
}

impl FeedGenerator {
    pub fn new(feed_size: usize) -> Self {
        Self { feed_size }
    }

    /// A feed with fresh random ids, about half the images described
    pub fn feed(&self) -> Vec<FeedImageRecord> {
        (0..self.feed_size)
            .map(|i| {
                let url = Url::parse(&format!("https://img.example.com/feed/{}.jpg", i))
                    .expect("valid fixture url");
                let image = FeedImageRecord::new(Uuid::new_v4(), url);
                if i % 2 == 0 {
                    image
                        .with_description(format!("Image number {}", i))
                        .with_location("Benchmark City")
                } else {
                    image
                }
            })
            .collect()
    }

    /// Several distinct feeds, to rotate through on repeated inserts
    pub fn feeds(&self, count: usize) -> Vec<Vec<FeedImageRecord>> {
        (0..count).map(|_| self.feed()).collect()
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_feed_generator() {
        use super::FeedGenerator;
        use std::collections::HashSet;

        let feed_gen = FeedGenerator::new(20);

        let feed = feed_gen.feed();
        assert_eq!(feed.len(), 20);

        let ids: HashSet<_> = feed.iter().map(|image| image.id).collect();
        assert_eq!(ids.len(), 20);

        assert_eq!(feed_gen.feeds(3).len(), 3);
    }
}
