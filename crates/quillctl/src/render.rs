//! Plain-text rendering of backend documents

use std::fmt::Write;

use chrono::DateTime;
use quillapi::{Comment, LikeEntry, Paginated, Post, PostStatistic, User, UserProfile};

/// Longest preview shown in listings
const PREVIEW_CHARS: usize = 80;

/// `2024-01-01T10:00:00Z` as `2024-01-01 10:00`; unparsable input unchanged
pub fn date(raw: &str) -> String {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(at) => at.format("%Y-%m-%d %H:%M").to_string(),
        Err(_) => raw.to_string(),
    }
}

fn heart(liked: bool) -> &'static str {
    if liked {
        "♥"
    } else {
        "♡"
    }
}

/// One listing line
pub fn post_line(post: &Post) -> String {
    format!(
        "#{:<5} {} {:>4}  {:>3} comments  {} by {}",
        post.id,
        heart(post.liked_by_me),
        post.likes,
        post.comments,
        post.title,
        post.author.name
    )
}

/// A page of posts with a pagination footer
pub fn page(page: &Paginated<Post>) -> String {
    if page.data.is_empty() {
        return "no posts".to_string();
    }

    let mut out = String::new();
    for post in &page.data {
        let _ = writeln!(out, "{}", post_line(post));
    }
    let _ = write!(out, "page {}/{} ({} total)", page.page, page.last_page, page.total);
    out
}

/// Full post view
pub fn post(post: &Post) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "#{} {}", post.id, post.title);
    let _ = writeln!(out, "by {} on {}", post.author.name, date(&post.created_at));
    if !post.tags.is_empty() {
        let _ = writeln!(out, "tags: {}", post.tags.join(", "));
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "{}", post.plain_text().trim());
    let _ = writeln!(out);
    let _ = write!(out, "{}", statistic(&PostStatistic::from(post)));
    out
}

/// Counter line
pub fn statistic(stat: &PostStatistic) -> String {
    format!("{} {} likes, {} comments", heart(stat.liked_by_me), stat.likes, stat.comments)
}

/// Comment thread
pub fn comments(comments: &[Comment]) -> String {
    if comments.is_empty() {
        return "no comments".to_string();
    }
    comments
        .iter()
        .map(|c| format!("[{}] {}: {}", date(&c.created_at), c.author.name, c.content))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Who liked a post
pub fn likes(likes: &[LikeEntry]) -> String {
    if likes.is_empty() {
        return "no likes".to_string();
    }
    likes
        .iter()
        .map(|l| match &l.user.username {
            Some(username) => format!("{} (@{})", l.user.name, username),
            None => l.user.name.clone(),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Account summary
pub fn user(user: &User) -> String {
    let mut out = format!("{} <{}>", user.name, user.email);
    if let Some(username) = &user.username {
        let _ = write!(out, " @{}", username);
    }
    if let Some(headline) = &user.headline {
        let _ = write!(out, "\n{}", headline);
    }
    out
}

/// Public profile with post previews
pub fn profile(profile: &UserProfile) -> String {
    let mut out = String::new();
    if let Some(user) = &profile.user {
        let _ = writeln!(out, "{}", self::user(user));
        let _ = writeln!(out);
    }
    for post in &profile.posts.data {
        let _ = writeln!(out, "{}", post_line(post));
        let preview: String = post.plain_text().chars().take(PREVIEW_CHARS).collect();
        let _ = writeln!(out, "        {}", preview.trim());
    }
    let _ = write!(out, "{} posts", profile.posts.total);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use quillapi::Author;

    fn sample() -> Post {
        Post {
            id: 5,
            title: "Hello".into(),
            content: "<p>Body <b>text</b></p>".into(),
            tags: vec!["rust".into()],
            image_url: None,
            created_at: "2024-03-01T09:30:00Z".into(),
            likes: 11,
            comments: 2,
            liked_by_me: true,
            author: Author { id: 1, name: "Ana".into(), ..Author::default() },
            extra: Default::default(),
        }
    }

    #[test]
    fn test_date() {
        assert_eq!(date("2024-03-01T09:30:00Z"), "2024-03-01 09:30");
        assert_eq!(date("yesterday"), "yesterday");
    }

    #[test]
    fn test_post_views() {
        let sample = sample();

        let line = post_line(&sample);
        assert!(line.starts_with("#5"));
        assert!(line.contains("♥"));
        assert!(line.contains("Hello by Ana"));

        let full = post(&sample);
        assert!(full.contains("Body text"));
        assert!(full.contains("tags: rust"));
        assert!(full.ends_with("♥ 11 likes, 2 comments"));
    }

    #[test]
    fn test_empty_listings() {
        let empty = Paginated::<Post> {
            data: vec![],
            total: 0,
            page: 1,
            last_page: 1,
            extra: Default::default(),
        };
        assert_eq!(page(&empty), "no posts");
        assert_eq!(comments(&[]), "no comments");
        assert_eq!(likes(&[]), "no likes");
    }
}
