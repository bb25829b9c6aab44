//! Command handler shared by one-shot invocations and the shell

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use quillapi::{
    ApiClient, BlogApi, NewPost, PasswordChange, PostUpdate, ProfileUpdate, RegisterRequest,
};
use quillcache::{BlogQueries, QueryCache, QueryKey, ToggleOutcome};
use tracing::info;

use crate::render;

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Create an account
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long, env = "QUILL_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Sign in and store the credential
    Login {
        email: String,
        #[arg(long, env = "QUILL_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Forget the stored credential
    Logout,
    /// Show the signed-in user
    Whoami,
    /// Recommended posts
    Feed {
        #[arg(long, default_value_t = 1)]
        page: u64,
        #[arg(long, default_value_t = 10)]
        limit: u64,
    },
    /// Search posts
    Search {
        query: String,
        #[arg(long, default_value_t = 1)]
        page: u64,
        #[arg(long, default_value_t = 10)]
        limit: u64,
    },
    /// Most liked posts
    MostLiked {
        #[arg(long, default_value_t = 1)]
        page: u64,
        #[arg(long, default_value_t = 10)]
        limit: u64,
    },
    /// Show a post
    Show { id: u64 },
    /// Like and comment counters of a post
    Stats { id: u64 },
    /// Toggle your like on a post
    Like { id: u64 },
    /// Who liked a post
    Likes { id: u64 },
    /// Comments on a post
    Comments { id: u64 },
    /// Comment on a post
    Comment {
        id: u64,
        #[arg(required = true, trailing_var_arg = true)]
        text: Vec<String>,
    },
    /// Publish a post
    Write {
        #[arg(long)]
        title: String,
        #[arg(long)]
        content: String,
        #[arg(long, value_delimiter = ',')]
        tags: Vec<String>,
        #[arg(long)]
        image_url: Option<String>,
    },
    /// Edit a post
    Edit {
        id: u64,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        content: Option<String>,
        #[arg(long, value_delimiter = ',')]
        tags: Option<Vec<String>>,
        #[arg(long)]
        image_url: Option<String>,
    },
    /// Delete a post
    Delete { id: u64 },
    /// Your posts
    MyPosts,
    /// Public profile of a user
    Profile { username: String },
    /// Edit your profile
    EditProfile {
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        headline: Option<String>,
    },
    /// Change your password
    ChangePassword {
        #[arg(long)]
        current: String,
        #[arg(long)]
        new: String,
    },
    /// Read commands from stdin, one per line, sharing one cache
    Shell,
    /// Cache statistics and cached keys
    CacheInfo {
        /// Only list keys under this prefix, such as `posts/detail`
        prefix: Option<String>,
    },
}

pub struct CommandHandler {
    client: Arc<ApiClient>,
    queries: BlogQueries<ApiClient>,
}

impl CommandHandler {
    pub fn new(client: Arc<ApiClient>, cache: QueryCache) -> Self {
        let queries = BlogQueries::new(cache, Arc::clone(&client));
        Self { client, queries }
    }

    /// Run one command and return its rendered output
    pub async fn handle(&self, command: Command) -> Result<String> {
        match command {
            Command::Register { name, username, email, password } => {
                let request = RegisterRequest { name, username, email, password };
                let user = self.client.register(&request).await?;
                Ok(format!("registered @{} (id {})", user.username, user.id))
            }
            Command::Login { email, password } => {
                let response = self.client.login(&email, &password).await?;
                // Projections fetched anonymously carry no likedByMe
                self.queries.cache().clear();
                Ok(match response.user {
                    Some(user) => format!("signed in as {}", render::user(&user)),
                    None => format!("signed in as {}", email),
                })
            }
            Command::Logout => {
                self.client.logout()?;
                self.queries.cache().clear();
                Ok("signed out".to_string())
            }
            Command::Whoami => match self.client.current_user() {
                Some(user) => Ok(render::user(&user)),
                None if self.client.is_authenticated() => Ok("signed in".to_string()),
                None => Ok("not signed in".to_string()),
            },
            Command::Feed { page, limit } => {
                Ok(render::page(&self.queries.recommended(page, limit).await?))
            }
            Command::Search { query, page, limit } => {
                Ok(render::page(&self.queries.search(&query, page, limit).await?))
            }
            Command::MostLiked { page, limit } => {
                Ok(render::page(&self.queries.most_liked(page, limit).await?))
            }
            Command::Show { id } => Ok(render::post(&self.queries.post(id).await?)),
            Command::Stats { id } => Ok(render::statistic(&self.queries.statistic(id).await?)),
            Command::Like { id } => self.like(id).await,
            Command::Likes { id } => Ok(render::likes(&self.queries.likes_of(id).await?)),
            Command::Comments { id } => Ok(render::comments(&self.queries.comments(id).await?)),
            Command::Comment { id, text } => {
                let comment = self.queries.create_comment(id, &text.join(" ")).await?;
                Ok(format!("comment {} added to #{}", comment.id, id))
            }
            Command::Write { title, content, tags, image_url } => {
                let post = NewPost { title, content, tags, image_url };
                let created = self.queries.create_post(&post).await?;
                Ok(format!("published #{} {}", created.id, created.title))
            }
            Command::Edit { id, title, content, tags, image_url } => {
                let update = PostUpdate { title, content, tags, image_url };
                if update.is_empty() {
                    bail!("nothing to change; pass --title, --content, --tags or --image-url");
                }
                let updated = self.queries.update_post(id, &update).await?;
                Ok(format!("updated #{} {}", updated.id, updated.title))
            }
            Command::Delete { id } => {
                self.queries.delete_post(id).await?;
                Ok(format!("deleted #{}", id))
            }
            Command::MyPosts => Ok(render::page(&self.queries.profile_posts().await?)),
            Command::Profile { username } => {
                Ok(render::profile(&self.queries.user_profile(&username).await?))
            }
            Command::EditProfile { name, headline } => {
                if name.is_none() && headline.is_none() {
                    bail!("nothing to change; pass --name or --headline");
                }
                let user = self.client.update_profile(&ProfileUpdate { name, headline }).await?;
                Ok(format!("profile updated: {}", render::user(&user)))
            }
            Command::ChangePassword { current, new } => {
                let change = PasswordChange { current_password: current, new_password: new };
                self.client.change_password(&change).await?;
                Ok("password changed".to_string())
            }
            Command::Shell => bail!("already in a shell"),
            Command::CacheInfo { prefix } => Ok(self.cache_info(prefix.as_deref())),
        }
    }

    async fn like(&self, id: u64) -> Result<String> {
        let outcome = self
            .queries
            .toggle_like(id)
            .await
            .with_context(|| format!("could not toggle like on #{}", id))?;

        info!(post = id, ?outcome, "like settled");
        Ok(match outcome {
            ToggleOutcome::Applied { liked: true } => format!("liked #{}", id),
            ToggleOutcome::Applied { liked: false } => format!("unliked #{}", id),
            ToggleOutcome::Coalesced => format!("a like on #{} is already in flight", id),
        })
    }

    fn cache_info(&self, prefix: Option<&str>) -> String {
        let prefix = prefix.map(QueryKey::parse);
        let cache = self.queries.cache();
        let mut info = format!(
            "# Cache\nsize:{}\ncapacity:{}\nstale_secs:{}\n{}\n\n# Keys",
            cache.len(),
            cache.capacity(),
            cache.config().stale_time.as_secs(),
            cache.stats()
        );
        let shown = cache
            .keys()
            .into_iter()
            .filter(|key| prefix.as_ref().map_or(true, |p| key.starts_with(p)));
        for key in shown {
            let state = if cache.is_stale(&key) { "stale" } else { "fresh" };
            info.push_str(&format!("\n{} ({})", key, state));
        }
        info
    }
}
