//
// backend.rs
//
// Wires the `tower_lsp::LanguageServer` trait to the pure `state`/
// `handlers` core. Holds the single mutable state cell (spec §4.8, §5,
// §9) behind one lock purely to satisfy `&self`-taking trait methods;
// the server is otherwise single-task cooperative, never concurrent.
//

use std::path::Path;
use std::sync::Arc;

use tokio::sync::RwLock;
use tower_lsp::jsonrpc::Result as RpcResult;
use tower_lsp::lsp_types::*;
use tower_lsp::Client;
use tower_lsp::LanguageServer;
use tower_lsp::LspService;
use tower_lsp::Server;

use crate::document::Document;
use crate::error::ServerError;
use crate::folder::Folder;
use crate::handlers;
use crate::path::NotePath;
use crate::queue::{PublishQueue, QueueHandle};
use crate::state::{self, State};

struct Inner {
    lsp_state: Option<State>,
    hierarchical_symbols: bool,
    /// Retained per the source's client-quirk handling, though behavior
    /// is currently identical regardless of client.
    #[allow(dead_code)]
    is_vscode: bool,
}

pub struct Backend {
    inner: RwLock<Inner>,
    queue: QueueHandle,
}

impl Backend {
    pub fn new(client: Client) -> Self {
        let queue = PublishQueue::spawn(Arc::new(client));
        Self {
            inner: RwLock::new(Inner {
                lsp_state: None,
                hierarchical_symbols: false,
                is_vscode: false,
            }),
            queue,
        }
    }

    async fn require_state<F, T>(&self, f: F) -> RpcResult<T>
    where
        F: FnOnce(&State) -> T,
    {
        let inner = self.inner.read().await;
        match &inner.lsp_state {
            Some(state) => Ok(f(state)),
            None => Err(ServerError::NotInitialized.into()),
        }
    }

    /// Commits `next` as the new state, diffing diagnostics and
    /// enqueuing publishes for whatever changed. No-op silently if the
    /// server isn't initialized (mirrors `NotInitialized` for
    /// notification handlers, which have no error channel).
    async fn commit(&self, next: State) {
        let mut inner = self.inner.write().await;
        let previous = match inner.lsp_state.take() {
            Some(previous) => previous,
            None => {
                log::warn!("ignoring state update before initialize");
                return;
            }
        };
        let committed = state::update_state(&previous, next, &self.queue);
        inner.lsp_state = Some(committed);
    }

    async fn root_for(&self, path: &NotePath) -> Option<NotePath> {
        let inner = self.inner.read().await;
        inner
            .lsp_state
            .as_ref()?
            .folder_for(path)
            .map(|f| f.root.clone())
    }

    async fn with_state<T>(&self, f: impl FnOnce(&State) -> T) -> Option<T> {
        let inner = self.inner.read().await;
        inner.lsp_state.as_ref().map(f)
    }
}

/// Resolves the workspace roots to index, per the fallback chain in
/// spec §6: `workspaceFolders`, then `rootUri`, then `rootPath`.
#[allow(deprecated)]
fn workspace_roots(params: &InitializeParams) -> crate::error::Result<Vec<(String, NotePath)>> {
    if let Some(folders) = &params.workspace_folders {
        if !folders.is_empty() {
            let mut roots = Vec::new();
            for folder in folders {
                let path = NotePath::from_uri(folder.uri.clone())?;
                roots.push((folder.name.clone(), path));
            }
            return Ok(roots);
        }
    }

    if let Some(uri) = &params.root_uri {
        let path = NotePath::from_uri(uri.clone())?;
        let name = folder_name(path.as_path());
        return Ok(vec![(name, path)]);
    }

    if let Some(root_path) = &params.root_path {
        let path = NotePath::parse(root_path)?;
        let name = folder_name(path.as_path());
        return Ok(vec![(name, path)]);
    }

    Err(ServerError::NoWorkspace)
}

fn folder_name(path: &Path) -> String {
    path.file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("workspace")
        .to_string()
}

fn file_operation_filter() -> FileOperationFilter {
    FileOperationFilter {
        scheme: Some("file".to_string()),
        pattern: FileOperationPattern {
            glob: "**/*.md".to_string(),
            matches: Some(FileOperationPatternKind::File),
            options: Some(FileOperationPatternOptions {
                ignore_case: Some(true),
            }),
        },
    }
}

fn is_markdown(uri: &Url) -> bool {
    uri.path()
        .rsplit('.')
        .next()
        .map(|ext| ext.eq_ignore_ascii_case("md"))
        .unwrap_or(false)
}

#[tower_lsp::async_trait]
impl LanguageServer for Backend {
    async fn initialize(&self, params: InitializeParams) -> RpcResult<InitializeResult> {
        log::info!("initializing mdwiki-lsp");

        let hierarchical_symbols = params
            .capabilities
            .text_document
            .as_ref()
            .and_then(|td| td.document_symbol.as_ref())
            .and_then(|ds| ds.hierarchical_document_symbol_support)
            .unwrap_or(false);

        #[allow(deprecated)]
        let is_vscode = params
            .client_info
            .as_ref()
            .map(|ci| ci.name == "Visual Studio Code")
            .unwrap_or(false);

        let roots = workspace_roots(&params).map_err(tower_lsp::jsonrpc::Error::from)?;

        let mut folders = Vec::new();
        for (name, root) in roots {
            match Folder::try_load(name, root.clone()) {
                Some(folder) => folders.push(folder),
                None => log::warn!("workspace root does not exist: {}", root.uri()),
            }
        }

        let committed = state::update_state(&State::default(), State::new(folders), &self.queue);

        let mut inner = self.inner.write().await;
        inner.lsp_state = Some(committed);
        inner.hierarchical_symbols = hierarchical_symbols;
        inner.is_vscode = is_vscode;
        drop(inner);

        Ok(InitializeResult {
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Options(
                    TextDocumentSyncOptions {
                        open_close: Some(true),
                        change: Some(TextDocumentSyncKind::INCREMENTAL),
                        ..Default::default()
                    },
                )),
                document_symbol_provider: Some(OneOf::Left(true)),
                workspace_symbol_provider: Some(OneOf::Left(true)),
                completion_provider: Some(CompletionOptions {
                    trigger_characters: Some(vec![
                        "[".to_string(),
                        ":".to_string(),
                        "|".to_string(),
                        "@".to_string(),
                    ]),
                    ..Default::default()
                }),
                definition_provider: Some(OneOf::Left(true)),
                hover_provider: Some(HoverProviderCapability::Simple(true)),
                folding_range_provider: Some(FoldingRangeProviderCapability::Simple(true)),
                workspace: Some(WorkspaceServerCapabilities {
                    workspace_folders: Some(WorkspaceFoldersServerCapabilities {
                        supported: Some(true),
                        change_notifications: Some(OneOf::Left(true)),
                    }),
                    file_operations: Some(WorkspaceFileOperationsServerCapabilities {
                        did_create: Some(FileOperationRegistrationOptions {
                            filters: vec![file_operation_filter()],
                        }),
                        did_delete: Some(FileOperationRegistrationOptions {
                            filters: vec![file_operation_filter()],
                        }),
                        ..Default::default()
                    }),
                }),
                ..Default::default()
            },
            server_info: Some(ServerInfo {
                name: "mdwiki-lsp".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        log::info!("mdwiki-lsp initialized");
        self.queue.start();
    }

    async fn shutdown(&self) -> RpcResult<()> {
        log::info!("mdwiki-lsp shutting down");
        self.queue.stop();
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let uri = params.text_document.uri.clone();
        let path = match NotePath::from_uri(uri.clone()) {
            Ok(p) => p,
            Err(err) => {
                log::warn!("didOpen: {err}");
                return;
            }
        };
        let Some(root) = self.root_for(&path).await else {
            log::warn!("didOpen: {}", ServerError::unknown_document(path.as_path()));
            return;
        };

        match Document::from_open(root, &params.text_document) {
            Ok(document) => {
                let next = self
                    .with_state(|state| state.with_document_updated(document))
                    .await;
                if let Some(next) = next {
                    self.commit(next).await;
                }
            }
            Err(err) => log::warn!("didOpen: {err}"),
        }
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let uri = params.text_document.uri.clone();
        let path = match NotePath::from_uri(uri) {
            Ok(p) => p,
            Err(err) => {
                log::warn!("didChange: {err}");
                return;
            }
        };

        let current = self.with_state(|state| state.document(&path).cloned()).await.flatten();
        let Some(current) = current else {
            log::warn!("didChange: {}", ServerError::unknown_document(path.as_path()));
            return;
        };

        match current.apply_change(&params.content_changes) {
            Ok(document) => {
                let next = self
                    .with_state(|state| state.with_document_updated(document))
                    .await;
                if let Some(next) = next {
                    self.commit(next).await;
                }
            }
            Err(err) => log::warn!("didChange: {err}"),
        }
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        let path = match NotePath::from_uri(params.text_document.uri) {
            Ok(p) => p,
            Err(err) => {
                log::warn!("didClose: {err}");
                return;
            }
        };
        let Some(root) = self.root_for(&path).await else {
            return;
        };

        let next = if path.as_path().exists() {
            match Document::load(root, path.clone()) {
                Ok(document) => self.with_state(|state| state.with_document_updated(document)).await,
                Err(err) => {
                    log::warn!("didClose: {err}");
                    None
                }
            }
        } else {
            self.with_state(|state| state.with_document_removed(&path)).await
        };

        if let Some(next) = next {
            self.commit(next).await;
        }
    }

    async fn did_change_workspace_folders(&self, params: DidChangeWorkspaceFoldersParams) {
        let current = self.with_state(|state| state.folders.clone()).await;
        let Some(mut folders) = current else {
            return;
        };

        for removed in params.event.removed {
            let Ok(root) = NotePath::from_uri(removed.uri) else { continue };
            folders.retain(|f| f.root != root);
        }
        for added in params.event.added {
            let Ok(root) = NotePath::from_uri(added.uri) else { continue };
            if let Some(folder) = Folder::try_load(added.name, root) {
                folders.push(folder);
            }
        }

        self.commit(State::new(folders)).await;
    }

    async fn did_create_files(&self, params: CreateFilesParams) {
        let mut next = self.with_state(|state| state.clone()).await;
        for file in params.files {
            if let Ok(url) = Url::parse(&file.uri) {
                if !is_markdown(&url) {
                    continue;
                }
                if let Ok(path) = NotePath::from_uri(url) {
                    if let Some(root) = next.as_ref().and_then(|s| s.folder_for(&path)).map(|f| f.root.clone()) {
                        match Document::load(root, path) {
                            Ok(document) => {
                                next = next.map(|s| s.with_document_updated(document));
                            }
                            Err(err) => log::warn!("didCreateFiles: {err}"),
                        }
                    }
                }
            }
        }
        if let Some(next) = next {
            self.commit(next).await;
        }
    }

    async fn did_delete_files(&self, params: DeleteFilesParams) {
        let mut next = self.with_state(|state| state.clone()).await;
        for file in params.files {
            if let Ok(url) = Url::parse(&file.uri) {
                if !is_markdown(&url) {
                    continue;
                }
                if let Ok(path) = NotePath::from_uri(url) {
                    next = next.map(|s| s.with_document_removed(&path));
                }
            }
        }
        if let Some(next) = next {
            self.commit(next).await;
        }
    }

    async fn folding_range(&self, params: FoldingRangeParams) -> RpcResult<Option<Vec<FoldingRange>>> {
        self.require_state(|state| handlers::folding_range(state, &params.text_document.uri))
            .await
    }

    async fn document_symbol(
        &self,
        params: DocumentSymbolParams,
    ) -> RpcResult<Option<DocumentSymbolResponse>> {
        let hierarchical = self.inner.read().await.hierarchical_symbols;
        self.require_state(|state| {
            handlers::document_symbol(state, &params.text_document.uri, hierarchical)
        })
        .await
    }

    async fn symbol(&self, params: WorkspaceSymbolParams) -> RpcResult<Option<Vec<SymbolInformation>>> {
        self.require_state(|state| handlers::workspace_symbol(state, &params.query))
            .await
    }

    async fn completion(&self, params: CompletionParams) -> RpcResult<Option<CompletionResponse>> {
        self.require_state(|state| {
            handlers::completion(
                state,
                &params.text_document_position.text_document.uri,
                params.text_document_position.position,
            )
        })
        .await
    }

    async fn hover(&self, params: HoverParams) -> RpcResult<Option<Hover>> {
        self.require_state(|state| {
            handlers::hover(
                state,
                &params.text_document_position_params.text_document.uri,
                params.text_document_position_params.position,
            )
        })
        .await
    }

    async fn goto_definition(
        &self,
        params: GotoDefinitionParams,
    ) -> RpcResult<Option<GotoDefinitionResponse>> {
        self.require_state(|state| {
            handlers::goto_definition(
                state,
                &params.text_document_position_params.text_document.uri,
                params.text_document_position_params.position,
            )
        })
        .await
    }
}

pub async fn start_lsp() -> anyhow::Result<()> {
    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();

    let (service, socket) = LspService::new(Backend::new);
    Server::new(stdin, stdout, socket).serve(service).await;

    Ok(())
}
