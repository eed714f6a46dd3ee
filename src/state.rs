use crate::config::Config;
use crate::services::{
    CommentRepository, CounterStore, HashtagIndexer, PostService, TreeMaterializer,
};
use crate::store::DynStore;
use crate::tasks::{self, TaskQueue};

#[derive(Clone)]
pub struct AppState {
    pub store: DynStore,
    pub config: Config,
    pub tasks: TaskQueue,
}

impl AppState {
    /// Builds the state and starts the side-effect worker on the current runtime.
    pub fn start(store: DynStore, config: Config) -> Self {
        let (tasks, receiver) = TaskQueue::channel();
        tasks::spawn_worker(
            HashtagIndexer::new(store.clone()),
            receiver,
            config.task_max_attempts,
        );
        AppState {
            store,
            config,
            tasks,
        }
    }

    pub fn posts(&self) -> PostService {
        PostService::new(self.store.clone(), self.tasks.clone())
    }

    pub fn comments(&self) -> CommentRepository {
        CommentRepository::new(
            self.store.clone(),
            self.tasks.clone(),
            self.config.comment_delete_mode,
        )
    }

    pub fn threads(&self) -> TreeMaterializer {
        TreeMaterializer::new(self.store.clone())
    }

    pub fn counters(&self) -> CounterStore {
        CounterStore::new(self.store.clone())
    }

    pub fn hashtags(&self) -> HashtagIndexer {
        HashtagIndexer::new(self.store.clone())
    }
}
