//! Browser runtime for the live update channel.
//!
//! Served at `/@hotpage/client.js`. Every development module imports
//! `createHotContext` from it through its preamble.

/// Runtime source for a channel listening on `hmr_port`.
#[must_use]
pub fn client_runtime(hmr_port: u16) -> String {
    CLIENT_RUNTIME.replace("__HOTPAGE_HMR_PORT__", &hmr_port.to_string())
}

/// `import.meta.hot` API:
/// - `hot.accept()` / `hot.accept(cb)` accepts the module's own updates
/// - `hot.dispose(cb)` runs before the replacement executes
/// - `hot.data` survives across replacements
/// - `hot.invalidate()` falls back to a full reload
const CLIENT_RUNTIME: &str = r#"// hotpage live update client
const hmrPort = __HOTPAGE_HMR_PORT__;
const contexts = new Map();
const OVERLAY_ID = '__hotpage_error_overlay';
const MAX_BACKOFF_MS = 5000;

let lastGeneration = Number(document.documentElement.dataset.hotpageGeneration || 0);
let backoff = 500;

function connect() {
  const url = `ws://${location.hostname}:${hmrPort}/__hmr?generation=${lastGeneration}`;
  const ws = new WebSocket(url);

  ws.onopen = () => {
    backoff = 500;
  };

  ws.onmessage = (event) => {
    let msg;
    try {
      msg = JSON.parse(event.data);
    } catch (err) {
      console.error('[hotpage] malformed message', err);
      return;
    }
    handleMessage(msg);
  };

  ws.onclose = () => {
    setTimeout(connect, backoff);
    backoff = Math.min(backoff * 2, MAX_BACKOFF_MS);
  };
}

function handleMessage(msg) {
  switch (msg.type) {
    case 'connected':
      console.debug(`[hotpage] connected (generation ${msg.generation})`);
      break;
    case 'update':
      hideOverlay();
      if (typeof msg.generation === 'number') lastGeneration = msg.generation;
      applyUpdate(msg.moduleId, msg.update);
      break;
    case 'reload':
      hideOverlay();
      location.reload();
      break;
    case 'error':
      showOverlay(msg.error, msg.stack);
      break;
  }
}

// Blob modules have no base URL; root-relative specifiers must be absolute.
function absolutize(code) {
  return code.replace(
    /(\bfrom\s*|\bimport\s*\(\s*|\bimport\s+)(["'])\/(?!\/)/g,
    (_, head, quote) => `${head}${quote}${location.origin}/`,
  );
}

async function applyUpdate(moduleId, code) {
  const ctx = contexts.get(moduleId);
  if (ctx && ctx.disposeCb) {
    ctx.disposeCb(ctx.data);
  }
  const blob = new Blob([absolutize(code)], { type: 'text/javascript' });
  const url = URL.createObjectURL(blob);
  try {
    const mod = await import(url);
    const next = contexts.get(moduleId);
    if (next && next.acceptCb) {
      next.acceptCb(mod);
    }
    console.debug(`[hotpage] updated ${moduleId}`);
  } catch (err) {
    console.error(`[hotpage] update failed for ${moduleId}`, err);
    location.reload();
  } finally {
    URL.revokeObjectURL(url);
  }
}

function showOverlay(message, stack) {
  let overlay = document.getElementById(OVERLAY_ID);
  if (!overlay) {
    overlay = document.createElement('div');
    overlay.id = OVERLAY_ID;
    overlay.style.cssText = [
      'position:fixed', 'inset:0', 'z-index:2147483647', 'overflow:auto',
      'background:rgba(20,20,20,0.92)', 'color:#ff6b6b', 'padding:32px',
      'font:14px/1.5 ui-monospace,monospace', 'white-space:pre-wrap',
    ].join(';');
    const close = document.createElement('button');
    close.textContent = 'Dismiss';
    close.style.cssText = 'position:absolute;top:12px;right:12px;cursor:pointer';
    close.onclick = hideOverlay;
    const body = document.createElement('pre');
    body.className = 'hotpage-error-body';
    overlay.append(close, body);
    document.body.appendChild(overlay);
  }
  overlay.querySelector('.hotpage-error-body').textContent =
    'Build failed\n\n' + message + (stack ? '\n\n' + stack : '');
  overlay.style.display = 'block';
}

function hideOverlay() {
  const overlay = document.getElementById(OVERLAY_ID);
  if (overlay) overlay.style.display = 'none';
}

export function createHotContext(moduleId) {
  let ctx = contexts.get(moduleId);
  if (!ctx) {
    ctx = { data: {}, acceptCb: null, disposeCb: null };
    contexts.set(moduleId, ctx);
  }
  return {
    get data() {
      return ctx.data;
    },
    accept(cb) {
      ctx.acceptCb = typeof cb === 'function' ? cb : null;
    },
    dispose(cb) {
      ctx.disposeCb = cb;
    },
    invalidate() {
      location.reload();
    },
  };
}

connect();
"#;
