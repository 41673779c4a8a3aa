//! Shared helpers for stagegate tests

use crate::definition::DefinitionId;
use crate::document::ProcessDocument;
use crate::graph::{ProcessGraph, ProcessId};
use crate::position::StepDirectory;
use crate::service::{NewDefinition, WorkflowService};

/// A three-group, five-checkpoint definition: groups of two, two, and one
/// items, with send-back, skip, and complete-group routes wired through
/// the gateways.
pub const SAMPLE_DOCUMENT: &str = r#"
processes:
  - id: DesignEntitlement
    name: Design & Entitlement
    nodes:
      - { id: start, kind: start }
      - { id: WFG1_CallActivity, kind: call-activity, name: Project Kickoff, calls: WFG1_ProjectKickoff }
      - { id: gw1, kind: gateway }
      - { id: WFG2_CallActivity, kind: call-activity, name: Schematic Design, calls: WFG2_SchematicDesign }
      - { id: gw2, kind: gateway }
      - { id: WFG3_CallActivity, kind: call-activity, name: Construction Docs, calls: WFG3_ConstructionDocs }
      - { id: gw3, kind: gateway }
      - { id: end, kind: end }
    flows:
      - { from: start, to: WFG1_CallActivity }
      - { from: WFG1_CallActivity, to: gw1 }
      - { from: gw1, to: WFG3_CallActivity, when: { action: skip_to, target_group: WFG3 } }
      - { from: gw1, to: WFG2_CallActivity }
      - { from: WFG2_CallActivity, to: gw2 }
      - { from: gw2, to: WFG1_CallActivity, when: { action: send_back, target_group: WFG1 } }
      - { from: gw2, to: WFG3_CallActivity }
      - { from: WFG3_CallActivity, to: gw3 }
      - { from: gw3, to: WFG2_CallActivity, when: { action: send_back, target_group: WFG2 } }
      - { from: gw3, to: end }
  - id: WFG1_ProjectKickoff
    nodes:
      - { id: start, kind: start }
      - { id: WFG1_WFI1, kind: user-task, name: Initial Project Review }
      - { id: gw_wfi1, kind: gateway }
      - { id: WFG1_WFI2, kind: user-task, name: Kickoff Meeting }
      - { id: gw_wfi2, kind: gateway }
      - { id: end, kind: end }
    flows:
      - { from: start, to: WFG1_WFI1 }
      - { from: WFG1_WFI1, to: gw_wfi1 }
      - { from: gw_wfi1, to: end, when: { action: skip_to } }
      - { from: gw_wfi1, to: end, when: { action: complete_wfg } }
      - { from: gw_wfi1, to: WFG1_WFI2 }
      - { from: WFG1_WFI2, to: gw_wfi2 }
      - { from: gw_wfi2, to: WFG1_WFI1, when: { action: send_back, target_item: WFI1 } }
      - { from: gw_wfi2, to: WFG1_WFI2, when: { action: send_back, target_item: WFI2 } }
      - { from: gw_wfi2, to: end }
  - id: WFG2_SchematicDesign
    nodes:
      - { id: start, kind: start }
      - { id: WFG2_WFI1, kind: user-task, name: Design Development }
      - { id: gw_wfi1, kind: gateway }
      - { id: WFG2_WFI2, kind: user-task, name: Design Review }
      - { id: gw_wfi2, kind: gateway }
      - { id: end, kind: end }
    flows:
      - { from: start, to: WFG2_WFI1 }
      - { from: WFG2_WFI1, to: gw_wfi1 }
      - { from: gw_wfi1, to: WFG2_WFI1, when: { action: send_back, target_item: WFI1 } }
      - { from: gw_wfi1, to: end, when: { action: send_back } }
      - { from: gw_wfi1, to: end, when: { action: complete_wfg } }
      - { from: gw_wfi1, to: WFG2_WFI2 }
      - { from: WFG2_WFI2, to: gw_wfi2 }
      - { from: gw_wfi2, to: WFG2_WFI1, when: { action: send_back, target_item: WFI1 } }
      - { from: gw_wfi2, to: WFG2_WFI2, when: { action: send_back, target_item: WFI2 } }
      - { from: gw_wfi2, to: end, when: { action: send_back } }
      - { from: gw_wfi2, to: end }
  - id: WFG3_ConstructionDocs
    nodes:
      - { id: start, kind: start }
      - { id: WFG3_WFI1, kind: user-task, name: Final Documentation }
      - { id: gw_wfi1, kind: gateway }
      - { id: end, kind: end }
    flows:
      - { from: start, to: WFG3_WFI1 }
      - { from: WFG3_WFI1, to: gw_wfi1 }
      - { from: gw_wfi1, to: WFG3_WFI1, when: { action: send_back, target_item: WFI1 } }
      - { from: gw_wfi1, to: end, when: { action: send_back } }
      - { from: gw_wfi1, to: end }
"#;

/// Compile the sample document rooted at its parent process
pub fn sample_graph() -> ProcessGraph {
    let document = ProcessDocument::parse(SAMPLE_DOCUMENT).expect("sample document parses");
    ProcessGraph::compile(&document, &ProcessId::new("DesignEntitlement"))
        .expect("sample document compiles")
}

/// An in-memory service holding the sample definition with v1 published
pub fn published_service() -> (WorkflowService, DefinitionId) {
    let mut service = WorkflowService::in_memory(StepDirectory::standard());
    let definition = service
        .create_definition(NewDefinition {
            name: "Design & Entitlement POC".to_string(),
            description: Some("Three-group design workflow".to_string()),
            process_id: ProcessId::new("DesignEntitlement"),
            document: SAMPLE_DOCUMENT.to_string(),
            change_notes: None,
            created_by: "system".to_string(),
        })
        .expect("sample definition is valid");
    service
        .publish_version(definition.id, 1)
        .expect("publishing v1 succeeds");
    (service, definition.id)
}
