mod create_post;
mod post_detail;
mod post_list;

pub use create_post::CreatePostView;
pub use post_detail::PostDetailView;
pub use post_list::PostListView;
