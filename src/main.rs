use bluetooth_coordinator::domain::models::{AppEvent, DeviceHandle};
use bluetooth_coordinator::domain::settings::SettingsService;
use bluetooth_coordinator::infrastructure::bluetooth::protocol::RawBroadcast;
use bluetooth_coordinator::infrastructure::logging;
use bluetooth_coordinator::infrastructure::simulated::SimulatedPlatform;
use bluetooth_coordinator::presentation::BluetoothScreen;
use bluetooth_coordinator::BluetoothManager;
use std::sync::{Arc, Mutex};
use tokio::time::{sleep, Duration};
use tracing::info;

const DELIVERY_DELAY_MS: u64 = 300;

fn nearby_devices() -> Vec<DeviceHandle> {
    vec![
        DeviceHandle::new("00:1A:7D:DA:71:13", Some("Living Room Speaker".to_string())),
        DeviceHandle::new("5C:F3:70:8B:2E:44", Some("Pixel Buds".to_string())),
        DeviceHandle::new("E4:5F:01:3C:9A:10", None),
    ]
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings_service = SettingsService::new()?;

    let _logging_guard = logging::init_logger(&settings_service.get().log_settings)
        .map_err(|e| eprintln!("Failed to initialize logging: {}", e))
        .ok();

    info!("Starting Bluetooth Coordinator");

    // Composition root: one platform, one manager, handed down by reference
    let settings = Arc::new(Mutex::new(settings_service));
    let platform = Arc::new(SimulatedPlatform::new());
    let manager = BluetoothManager::from_platform(platform.clone(), settings);

    let mut screen = BluetoothScreen::new(manager.clone());
    screen.on_start();
    screen.on_enable_clicked();
    screen.on_make_discoverable_clicked();
    screen.on_start_discovery_clicked();

    // Stand-in radio: devices trickle in, the window closes, one of them connects
    let radio = platform.clone();
    let script = tokio::spawn(async move {
        let devices = nearby_devices();
        for device in &devices {
            sleep(Duration::from_millis(DELIVERY_DELAY_MS)).await;
            radio.deliver(RawBroadcast::device_found(device));
        }
        sleep(Duration::from_millis(DELIVERY_DELAY_MS)).await;
        radio.deliver(RawBroadcast::discovery_finished());

        sleep(Duration::from_millis(DELIVERY_DELAY_MS)).await;
        radio.deliver(RawBroadcast::acl_connected(&devices[1]));
    });

    while let Some(event) = screen.next_event().await {
        info!("Screen event: {:?}", event);
        if matches!(event, AppEvent::DeviceConnected(_)) {
            break;
        }
    }
    script.await?;

    for line in screen.render() {
        println!("{}", line);
    }

    screen.on_stop();
    info!(
        "Session state at exit: {:?}, advertising: {:?}",
        manager.session_state(),
        manager.advertising_status()
    );
    Ok(())
}
